//! Wallet session state machine.
//!
//! Push events from the provider and the periodic reconciliation poll can race.
//! Both are turned into [`Observation`]s and fed through [`reconcile`], a pure
//! function. The state keeps the latest account report and chain result
//! separately and derives the connected account from both, so the order in
//! which a poll and a push report the same provider state does not matter and
//! repeating an observation changes nothing.

use crate::{
    format::{
        NOT_CONNECTED,
        UNKNOWN_NETWORK,
        ZERO_BALANCE,
        format_balance,
        network_name,
        short_address,
    },
    provider::{
        ProviderError,
        ProviderEvent,
        WalletProvider,
    },
};
use alloy::primitives::{
    Address,
    U256,
};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub network_name: String,
    pub balance: String,
    pub installed: bool,
    reported_account: Option<Address>,
    chain_unavailable: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Disconnected,
            account: None,
            chain_id: None,
            network_name: NOT_CONNECTED.to_owned(),
            balance: ZERO_BALANCE.to_owned(),
            installed: false,
            reported_account: None,
            chain_unavailable: false,
        }
    }
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        self.account.is_some()
    }

    fn clear_account(&mut self) {
        self.phase = Phase::Disconnected;
        self.account = None;
        self.balance = ZERO_BALANCE.to_owned();
    }

    fn clear_network(&mut self) {
        self.chain_id = None;
        self.network_name = NOT_CONNECTED.to_owned();
        self.chain_unavailable = false;
    }

    /// The account the provider currently exposes, or none while the chain
    /// cannot be read.
    fn effective_account(&self) -> Option<Address> {
        if self.chain_unavailable {
            None
        } else {
            self.reported_account
        }
    }
}

/// What the provider reported, from either a push event or a poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observation {
    ProviderMissing,
    Accounts(Vec<Address>),
    AccountsUnavailable,
    Chain(u64),
    ChainUnavailable,
    Disconnected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Connected(Address),
    ConnectFailed(String),
    NotInstalled,
    AccountChanged(Address),
    NetworkChanged(String),
    Disconnected,
    /// The provider reported no accounts, as after locking the wallet.
    SignedOut,
}

impl Notice {
    pub fn is_error(&self) -> bool {
        matches!(self, Notice::ConnectFailed(_) | Notice::NotInstalled)
    }

    pub fn message(&self) -> String {
        match self {
            Notice::Connected(account) => {
                format!("Wallet connected: {}", short_address(*account))
            }
            Notice::ConnectFailed(reason) => format!("Connection failed: {reason}"),
            Notice::NotInstalled => {
                "No keystore wallet found. Add a JSON keystore to the wallet directory."
                    .to_owned()
            }
            Notice::AccountChanged(account) => {
                format!("Account changed to {}", short_address(*account))
            }
            Notice::NetworkChanged(name) => format!("Network changed to {name}"),
            Notice::Disconnected => "Wallet disconnected".to_owned(),
            Notice::SignedOut => "Wallet locked, no account available".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    RefreshBalance(Address),
    Notify(Notice),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionState,
    pub effects: Vec<Effect>,
}

pub fn reconcile(state: &SessionState, observation: Observation) -> Transition {
    let mut next = state.clone();
    let mut effects = Vec::new();
    let mut chain_switched = false;
    let mut signed_out = false;

    match observation {
        Observation::ProviderMissing => {
            next.installed = false;
            next.reported_account = None;
            next.clear_network();
        }
        Observation::Accounts(accounts) => {
            next.reported_account = accounts.first().copied();
            if next.reported_account.is_some() {
                next.installed = true;
            } else {
                signed_out = true;
            }
        }
        Observation::AccountsUnavailable => {
            next.reported_account = None;
        }
        Observation::Chain(chain_id) => {
            next.chain_unavailable = false;
            next.chain_id = Some(chain_id);
            next.network_name = network_name(chain_id);
            if state.chain_id != Some(chain_id) {
                chain_switched = true;
                if state.chain_id.is_some() {
                    effects.push(Effect::Notify(Notice::NetworkChanged(
                        next.network_name.clone(),
                    )));
                }
            }
        }
        Observation::ChainUnavailable => {
            next.chain_unavailable = true;
            next.chain_id = None;
            next.network_name = UNKNOWN_NETWORK.to_owned();
        }
        Observation::Disconnected => {
            next.reported_account = None;
            next.clear_network();
        }
    }

    match (state.account, next.effective_account()) {
        (previous, Some(account)) if previous != Some(account) => {
            next.phase = Phase::Connected;
            next.account = Some(account);
            next.balance = ZERO_BALANCE.to_owned();
            effects.insert(0, Effect::RefreshBalance(account));
            if previous.is_some() {
                effects.push(Effect::Notify(Notice::AccountChanged(account)));
            }
        }
        (_, Some(account)) => {
            next.phase = Phase::Connected;
            if chain_switched {
                effects.insert(0, Effect::RefreshBalance(account));
            }
        }
        (previous, None) => {
            next.clear_account();
            if previous.is_some() {
                let notice = if signed_out {
                    Notice::SignedOut
                } else {
                    Notice::Disconnected
                };
                effects.push(Effect::Notify(notice));
            }
        }
    }

    Transition { next, effects }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("No wallet provider is installed")]
    NotInstalled,
    #[error("Cannot connect while the session is {0:?}")]
    InvalidPhase(Phase),
    #[error("Could not read the wallet's network")]
    NetworkUnavailable,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Sole owner of the session fields. Views read [`WalletSession::state`] and
/// change it only through the named operations.
pub struct WalletSession<P> {
    provider: P,
    state: SessionState,
    notices: Vec<Notice>,
}

impl<P: WalletProvider> WalletSession<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            state: SessionState::default(),
            notices: Vec::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.clone()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Probes the provider once at startup.
    pub async fn initialize(&mut self) {
        if !self.provider.is_installed().await {
            tracing::info!("no wallet provider available");
            let refreshes = self.observe(Observation::ProviderMissing);
            self.refresh_balances(refreshes).await;
            return;
        }
        self.state.installed = true;
        self.poll().await;
    }

    pub async fn connect(&mut self, approval: P::Approval) -> Result<Address, ConnectError> {
        if self.state.phase != Phase::Disconnected {
            return Err(ConnectError::InvalidPhase(self.state.phase));
        }
        if !self.provider.is_installed().await {
            self.state.installed = false;
            self.notices.push(Notice::NotInstalled);
            return Err(ConnectError::NotInstalled);
        }
        self.state.installed = true;
        self.state.phase = Phase::Connecting;

        let accounts = match self.provider.request_accounts(approval).await {
            Ok(accounts) => accounts,
            Err(err) => {
                tracing::warn!(%err, "wallet connection failed");
                self.state.phase = Phase::Disconnected;
                self.notices.push(Notice::ConnectFailed(err.to_string()));
                return Err(err.into());
            }
        };
        let Some(account) = accounts.first().copied() else {
            self.state.phase = Phase::Disconnected;
            self.notices
                .push(Notice::ConnectFailed("no accounts returned".to_owned()));
            return Err(ProviderError::UserRejected.into());
        };

        let chain = self.read_chain().await;
        let mut refreshes = self.observe(chain);
        refreshes.extend(self.observe(Observation::Accounts(accounts)));
        if self.state.account != Some(account) {
            tracing::warn!(%account, "account granted but network unreadable");
            self.state.phase = Phase::Disconnected;
            let err = ConnectError::NetworkUnavailable;
            self.notices.push(Notice::ConnectFailed(err.to_string()));
            return Err(err);
        }
        self.refresh_balances(refreshes).await;
        tracing::info!(%account, "wallet connected");
        self.notices.push(Notice::Connected(account));
        Ok(account)
    }

    /// Best-effort revocation, then an unconditional local reset.
    pub async fn disconnect(&mut self) {
        self.state.phase = Phase::Disconnecting;
        if let Err(err) = self.provider.revoke_permissions().await {
            tracing::debug!(%err, "permission revocation failed, clearing session anyway");
        }
        let had_account = self.state.account.is_some();
        self.state.reported_account = None;
        self.state.clear_account();
        self.state.clear_network();
        if had_account {
            self.notices.push(Notice::Disconnected);
        }
        tracing::info!("wallet disconnected");
    }

    /// Reconciliation tick. Covers providers that drop push events.
    pub async fn refresh(&mut self) {
        if !self.provider.is_installed().await {
            let refreshes = self.observe(Observation::ProviderMissing);
            self.refresh_balances(refreshes).await;
            return;
        }
        self.state.installed = true;
        self.poll().await;
    }

    pub async fn handle_event(&mut self, event: ProviderEvent) {
        tracing::debug!(?event, "provider event");
        let observation = match event {
            ProviderEvent::AccountsChanged(accounts) => Observation::Accounts(accounts),
            ProviderEvent::ChainChanged(chain_id) => Observation::Chain(chain_id),
            ProviderEvent::Disconnect { message } => {
                tracing::info!(%message, "provider disconnected");
                Observation::Disconnected
            }
        };
        let refreshes = self.observe(observation);
        self.refresh_balances(refreshes).await;
    }

    /// Applies a balance read for `account`. Returns false when the account is
    /// no longer the connected one and the result was dropped.
    pub fn apply_balance(
        &mut self,
        account: Address,
        result: Result<U256, ProviderError>,
    ) -> bool {
        if self.state.account != Some(account) {
            tracing::debug!(%account, "discarding balance for inactive account");
            return false;
        }
        self.state.balance = match result {
            Ok(wei) => format_balance(wei),
            Err(err) => {
                tracing::warn!(%account, %err, "balance fetch failed");
                ZERO_BALANCE.to_owned()
            }
        };
        true
    }

    async fn poll(&mut self) {
        let mut refreshes = match self.provider.accounts().await {
            Ok(accounts) => self.observe(Observation::Accounts(accounts)),
            Err(err) => {
                tracing::warn!(%err, "account read failed, assuming disconnected");
                self.observe(Observation::AccountsUnavailable)
            }
        };
        let chain = self.read_chain().await;
        refreshes.extend(self.observe(chain));
        self.refresh_balances(refreshes).await;
    }

    async fn read_chain(&self) -> Observation {
        match self.provider.chain_id().await {
            Ok(chain_id) => Observation::Chain(chain_id),
            Err(err) => {
                tracing::warn!(%err, "chain id read failed, assuming disconnected");
                Observation::ChainUnavailable
            }
        }
    }

    fn observe(&mut self, observation: Observation) -> Vec<Address> {
        let Transition { next, effects } = reconcile(&self.state, observation);
        self.state = next;
        let mut refreshes = Vec::new();
        for effect in effects {
            match effect {
                Effect::RefreshBalance(account) => refreshes.push(account),
                Effect::Notify(notice) => self.notices.push(notice),
            }
        }
        refreshes
    }

    async fn refresh_balances(&mut self, mut accounts: Vec<Address>) {
        accounts.dedup();
        for account in accounts {
            if self.state.account != Some(account) {
                continue;
            }
            let result = self.provider.balance(account).await;
            self.apply_balance(account, result);
        }
    }
}
