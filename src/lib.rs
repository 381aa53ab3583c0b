pub mod bets;

pub mod contract;

pub mod fetch;

pub mod format;

pub mod mutations;

pub mod prefs;

pub mod provider;

pub mod session;

pub mod wallets;

pub mod test_helpers;
