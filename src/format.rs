//! Display helpers for addresses, networks, amounts and dates.

use alloy::primitives::{
    Address,
    U256,
    utils::format_ether,
};
use chrono::DateTime;

pub const NOT_CONNECTED: &str = "Not Connected";
pub const UNKNOWN_NETWORK: &str = "Unknown Network";
pub const ZERO_BALANCE: &str = "0";

const KNOWN_NETWORKS: &[(u64, &str)] = &[
    (0x1, "Ethereum Mainnet"),
    (0x5, "Goerli Testnet"),
    (0xaa36a7, "Sepolia Testnet"),
    (0x89, "Polygon Mainnet"),
    (0x13881, "Mumbai Testnet"),
    (0xa, "Optimism Mainnet"),
    (0xa4b1, "Arbitrum One"),
    (0x38, "BNB Smart Chain"),
    (0xa86a, "Avalanche C-Chain"),
    (0xfa, "Fantom Opera"),
    (crate::contract::DESTINATION_CHAIN_ID, "Interop Alpha"),
];

// 10^14 wei, the smallest step shown by `format_balance`
const BALANCE_STEP: u64 = 100_000_000_000_000;
const BALANCE_DECIMALS: usize = 4;

/// Shortens an address-like string to `0x1234...abcd`.
pub fn format_address(addr: &str) -> String {
    let chars: Vec<char> = addr.chars().collect();
    if chars.len() < 10 {
        return addr.to_owned();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub fn short_address(addr: Address) -> String {
    format_address(&addr.to_checksum(None))
}

pub fn chain_id_hex(chain_id: u64) -> String {
    format!("0x{chain_id:x}")
}

pub fn network_name(chain_id: u64) -> String {
    KNOWN_NETWORKS
        .iter()
        .find(|(id, _)| *id == chain_id)
        .map(|(_, name)| (*name).to_owned())
        .unwrap_or_else(|| {
            format!("{UNKNOWN_NETWORK} ({})", chain_id_hex(chain_id))
        })
}

/// Ether amount rounded half-up to four decimals, e.g. `1.2346`.
pub fn format_balance(wei: U256) -> String {
    let step = U256::from(BALANCE_STEP);
    let rounded = wei.saturating_add(step / U256::from(2)) / step;
    let scale = U256::from(10u64.pow(BALANCE_DECIMALS as u32));
    let whole = rounded / scale;
    let frac = (rounded % scale).to_string();
    format!("{whole}.{frac:0>width$}", width = BALANCE_DECIMALS)
}

/// Full-precision ether amount without trailing zeros, e.g. `0.5`.
pub fn display_ether(wei: U256) -> String {
    let full = format_ether(wei);
    if !full.contains('.') {
        return full;
    }
    full.trim_end_matches('0').trim_end_matches('.').to_owned()
}

/// UTC calendar date for a unix timestamp.
pub fn display_date(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use alloy::primitives::address;

    #[test]
    fn format_address__long_input__keeps_head_and_tail() {
        // given
        let addr = "0xABCDEF0123456789ABCDEF0123456789ABCD1234";

        // when
        let actual = format_address(addr);

        // then
        assert_eq!(actual, "0xABCD...1234");
    }

    #[test]
    fn format_address__short_input__is_unchanged() {
        assert_eq!(format_address("0x1234"), "0x1234");
        assert_eq!(format_address(""), "");
    }

    #[test]
    fn short_address__uses_checksum_form() {
        // given
        let addr = address!("80ecd58d3c6ffa3e2b598c0a75492e2127d1c72c");

        // when
        let actual = short_address(addr);

        // then
        assert_eq!(actual, "0x80eC...c72c");
    }

    #[test]
    fn network_name__known_chain__returns_label() {
        assert_eq!(network_name(1), "Ethereum Mainnet");
        assert_eq!(network_name(11155111), "Sepolia Testnet");
        assert_eq!(network_name(42161), "Arbitrum One");
        assert_eq!(network_name(420120001), "Interop Alpha");
    }

    #[test]
    fn network_name__unknown_chain__includes_hex_id() {
        assert_eq!(network_name(31337), "Unknown Network (0x7a69)");
    }

    #[test]
    fn format_balance__rounds_to_four_decimals() {
        // given
        let wei = U256::from(1_234_567_000_000_000_000u64);

        // when
        let actual = format_balance(wei);

        // then
        assert_eq!(actual, "1.2346");
    }

    #[test]
    fn format_balance__zero__pads_decimals() {
        assert_eq!(format_balance(U256::ZERO), "0.0000");
    }

    #[test]
    fn display_ether__trims_trailing_zeros() {
        assert_eq!(display_ether(U256::from(500_000_000_000_000_000u64)), "0.5");
        assert_eq!(display_ether(U256::from(2_000_000_000_000_000_000u64)), "2");
        assert_eq!(display_ether(U256::ZERO), "0");
    }

    #[test]
    fn display_date__formats_utc_day() {
        assert_eq!(display_date(1_767_225_600), "2026-01-01");
    }
}
