//! Create, join, resolve and expiry-check flows.
//!
//! Checks here only guard the UI. The contract re-validates everything.

use crate::{
    bets::{
        BetStatus,
        BetView,
    },
    contract::{
        BetReader,
        BetWriter,
        ContractError,
        CreateBetCall,
        JoinBetCall,
        ResolveBetCall,
        TxOutcome,
    },
    format::display_ether,
};
use alloy::primitives::{
    Address,
    U256,
    utils::parse_ether,
};
use chrono::{
    DateTime,
    NaiveDate,
    Utc,
};
use std::str::FromStr;
use thiserror::Error;

/// 0.01 ether
pub const MIN_STAKE_WEI: u64 = 10_000_000_000_000_000;
pub const EXPIRY_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("'{0}' is not a valid ETH amount")]
    InvalidAmount(String),
    #[error("Stake must be at least 0.01 ETH")]
    StakeTooSmall,
    #[error("'{0}' is not a date (expected YYYY-MM-DD)")]
    InvalidDate(String),
    #[error("Expiration must be in the future")]
    ExpiryInPast,
    #[error("'{0}' is not a valid resolver address")]
    InvalidResolver(String),
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("Connect a wallet first")]
    NotConnected,
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Invalid(#[from] FormError),
    #[error("Transaction rejected")]
    Rejected,
    #[error("Transaction failed: {0}")]
    Reverted(String),
    #[error("Network error: {0}")]
    Network(String),
}

impl From<ContractError> for MutationError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::Rejected => MutationError::Rejected,
            ContractError::Reverted(reason) => MutationError::Reverted(reason),
            ContractError::NoSigner => MutationError::NotConnected,
            other => MutationError::Network(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateBetForm {
    pub title: String,
    pub description: String,
    pub amount: String,
    pub expiry: String,
    pub resolver: String,
}

impl CreateBetForm {
    pub const FIELDS: [&'static str; 5] = [
        "Title",
        "Description",
        "Stake (ETH)",
        "Expires (YYYY-MM-DD)",
        "Resolver address",
    ];

    pub fn field_mut(&mut self, idx: usize) -> Option<&mut String> {
        match idx {
            0 => Some(&mut self.title),
            1 => Some(&mut self.description),
            2 => Some(&mut self.amount),
            3 => Some(&mut self.expiry),
            4 => Some(&mut self.resolver),
            _ => None,
        }
    }

    pub fn field(&self, idx: usize) -> &str {
        match idx {
            0 => &self.title,
            1 => &self.description,
            2 => &self.amount,
            3 => &self.expiry,
            4 => &self.resolver,
            _ => "",
        }
    }

    /// Checks the inputs and builds the contract call.
    pub fn validate(
        &self,
        now: DateTime<Utc>,
        destination_chain_id: u64,
    ) -> Result<CreateBetCall, FormError> {
        let title = required(&self.title, "Title")?;
        let description = required(&self.description, "Description")?;
        let amount = required(&self.amount, "Stake")?;
        let expiry = required(&self.expiry, "Expiration date")?;
        let resolver = required(&self.resolver, "Resolver")?;

        let stake = parse_ether(amount)
            .map_err(|_| FormError::InvalidAmount(amount.to_owned()))?;
        if stake < U256::from(MIN_STAKE_WEI) {
            return Err(FormError::StakeTooSmall);
        }

        let expiry_timestamp = NaiveDate::parse_from_str(expiry, EXPIRY_FORMAT)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|midnight| midnight.and_utc().timestamp())
            .ok_or_else(|| FormError::InvalidDate(expiry.to_owned()))?;
        if expiry_timestamp <= now.timestamp() {
            return Err(FormError::ExpiryInPast);
        }

        let resolver = Address::from_str(resolver)
            .ok()
            .filter(|addr| !addr.is_zero())
            .ok_or_else(|| FormError::InvalidResolver(resolver.to_owned()))?;

        Ok(CreateBetCall {
            destination_chain_id,
            description: format!("{title} - {description}"),
            expiry_timestamp: u64::try_from(expiry_timestamp)
                .map_err(|_| FormError::InvalidDate(expiry.to_owned()))?,
            resolver,
            stake,
        })
    }
}

fn required<'a>(value: &'a str, name: &'static str) -> Result<&'a str, FormError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FormError::MissingField(name));
    }
    Ok(trimmed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Winner {
    Creator,
    Joiner,
}

impl Winner {
    pub fn label(self) -> &'static str {
        match self {
            Winner::Creator => "Creator",
            Winner::Joiner => "Joiner",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Winner::Creator => Winner::Joiner,
            Winner::Joiner => Winner::Creator,
        }
    }
}

pub fn prepare_join(
    bet: &BetView,
    viewer: Option<Address>,
    destination_chain_id: u64,
    now: u64,
) -> Result<JoinBetCall, MutationError> {
    let joiner = viewer.ok_or(MutationError::NotConnected)?;
    if joiner == bet.creator {
        return Err(MutationError::Unauthorized(
            "You cannot join your own bet".to_owned(),
        ));
    }
    if bet.status != BetStatus::Open {
        return Err(MutationError::Unauthorized(format!(
            "Bet #{} is {} and cannot be joined",
            bet.id, bet.status
        )));
    }
    if bet.is_expired(now) {
        return Err(MutationError::Unauthorized(format!(
            "Bet #{} has expired",
            bet.id
        )));
    }
    Ok(JoinBetCall {
        destination_chain_id,
        bet_id: bet.id,
        creator: bet.creator,
        joiner,
        stake: bet.stake,
    })
}

/// Confirms with the contract that `viewer` is the designated resolver.
pub async fn prepare_resolve<R: BetReader>(
    reader: &R,
    bet: &BetView,
    viewer: Option<Address>,
    winner: Winner,
    destination_chain_id: u64,
) -> Result<ResolveBetCall, MutationError> {
    let viewer = viewer.ok_or(MutationError::NotConnected)?;
    if bet.status != BetStatus::Joined {
        return Err(MutationError::Unauthorized(format!(
            "Bet #{} is {} and cannot be resolved",
            bet.id, bet.status
        )));
    }
    let resolver = reader.bet_resolver(bet.id).await?;
    if resolver != viewer {
        return Err(MutationError::Unauthorized(
            "Only the designated resolver can resolve this bet".to_owned(),
        ));
    }
    let winner = match winner {
        Winner::Creator => bet.creator,
        Winner::Joiner => bet.joiner.ok_or_else(|| {
            MutationError::Unauthorized(format!("Bet #{} has no joiner", bet.id))
        })?,
    };
    Ok(ResolveBetCall {
        destination_chain_id,
        bet_id: bet.id,
        winner,
    })
}

pub fn prepare_expiry_check(
    bet: &BetView,
    viewer: Option<Address>,
    now: u64,
) -> Result<U256, MutationError> {
    viewer.ok_or(MutationError::NotConnected)?;
    if bet.status != BetStatus::Open || !bet.is_expired(now) {
        return Err(MutationError::Unauthorized(format!(
            "Bet #{} is not an expired open bet",
            bet.id
        )));
    }
    Ok(bet.id)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Create(CreateBetCall),
    Join(JoinBetCall),
    Resolve(ResolveBetCall),
    CheckExpiry(U256),
}

impl Mutation {
    pub fn describe(&self) -> String {
        match self {
            Mutation::Create(call) => format!(
                "Creating bet with {} ETH stake",
                display_ether(call.stake)
            ),
            Mutation::Join(call) => format!(
                "Joining bet #{} with {} ETH",
                call.bet_id,
                display_ether(call.stake)
            ),
            Mutation::Resolve(call) => format!("Resolving bet #{}", call.bet_id),
            Mutation::CheckExpiry(id) => format!("Checking expiry of bet #{id}"),
        }
    }
}

/// Sends one transaction and waits for it to be mined.
pub async fn submit<W: BetWriter>(
    writer: &W,
    mutation: Mutation,
) -> Result<TxOutcome, MutationError> {
    tracing::info!(action = %mutation.describe(), "submitting transaction");
    let result = match mutation {
        Mutation::Create(call) => writer.create_bet(call).await,
        Mutation::Join(call) => writer.join_bet(call).await,
        Mutation::Resolve(call) => writer.resolve_bet(call).await,
        Mutation::CheckExpiry(id) => writer.check_expired(id).await,
    };
    match result {
        Ok(outcome) => {
            tracing::info!(tx_hash = %outcome.tx_hash, "transaction confirmed");
            Ok(outcome)
        }
        Err(err) => {
            tracing::error!(%err, "transaction failed");
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::{
        bets::BetView,
        test_helpers::{
            FakeBetContract,
            Submitted,
            sample_bet,
        },
    };
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn valid_form() -> CreateBetForm {
        CreateBetForm {
            title: "BTC above 100k".to_owned(),
            description: "By end of year".to_owned(),
            amount: "0.25".to_owned(),
            expiry: "2026-12-31".to_owned(),
            resolver: "0x00000000000000000000000000000000000000aa".to_owned(),
        }
    }

    #[test]
    fn validate__good_form__builds_call_with_composed_description() {
        // when
        let call = valid_form().validate(now(), 420120001).unwrap();

        // then
        assert_eq!(call.description, "BTC above 100k - By end of year");
        assert_eq!(call.stake, U256::from(250_000_000_000_000_000u64));
        assert_eq!(call.expiry_timestamp, 1_798_675_200);
        assert_eq!(call.destination_chain_id, 420120001);
        assert_eq!(call.resolver, Address::with_last_byte(0xaa));
    }

    #[test]
    fn validate__blank_field__is_missing() {
        // given
        let form = CreateBetForm {
            description: "   ".to_owned(),
            ..valid_form()
        };

        // when
        let result = form.validate(now(), 1);

        // then
        assert_eq!(result, Err(FormError::MissingField("Description")));
    }

    #[test]
    fn validate__stake_below_minimum__is_rejected() {
        // given
        let form = CreateBetForm {
            amount: "0.009".to_owned(),
            ..valid_form()
        };

        // then
        assert_eq!(form.validate(now(), 1), Err(FormError::StakeTooSmall));
    }

    #[test]
    fn validate__non_numeric_stake__is_invalid() {
        // given
        let form = CreateBetForm {
            amount: "lots".to_owned(),
            ..valid_form()
        };

        // then
        assert_eq!(
            form.validate(now(), 1),
            Err(FormError::InvalidAmount("lots".to_owned()))
        );
    }

    #[test]
    fn validate__past_or_today_expiry__is_rejected() {
        for expiry in ["2026-10-17", "2020-01-01"] {
            let form = CreateBetForm {
                expiry: expiry.to_owned(),
                ..valid_form()
            };
            assert_eq!(form.validate(now(), 1), Err(FormError::ExpiryInPast));
        }
    }

    #[test]
    fn validate__zero_resolver__is_rejected() {
        // given
        let form = CreateBetForm {
            resolver: "0x0000000000000000000000000000000000000000".to_owned(),
            ..valid_form()
        };

        // then
        assert!(matches!(
            form.validate(now(), 1),
            Err(FormError::InvalidResolver(_))
        ));
    }

    fn open_bet(creator: Address) -> BetView {
        BetView::from_raw(sample_bet(5, creator, "Open - bet", U256::from(9u64), 0), None)
    }

    #[test]
    fn prepare_join__attaches_matching_stake() {
        // given
        let creator = Address::repeat_byte(1);
        let me = Address::repeat_byte(2);

        // when
        let call = prepare_join(&open_bet(creator), Some(me), 7, 0).unwrap();

        // then
        assert_eq!(call.stake, U256::from(9u64));
        assert_eq!(call.joiner, me);
        assert_eq!(call.creator, creator);
        assert_eq!(call.destination_chain_id, 7);
    }

    #[test]
    fn prepare_join__own_bet_or_disconnected__is_refused() {
        let creator = Address::repeat_byte(1);
        assert!(matches!(
            prepare_join(&open_bet(creator), Some(creator), 7, 0),
            Err(MutationError::Unauthorized(_))
        ));
        assert!(matches!(
            prepare_join(&open_bet(creator), None, 7, 0),
            Err(MutationError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn prepare_resolve__non_resolver__is_unauthorized() {
        // given
        let creator = Address::repeat_byte(1);
        let joiner = Address::repeat_byte(2);
        let mut raw = sample_bet(5, creator, "Joined - bet", U256::from(1u64), 1);
        raw.joiner = joiner;
        let contract = FakeBetContract::with_bets(vec![raw.clone()]);
        let bet = BetView::from_raw(raw, Some(joiner));

        // when
        let result =
            prepare_resolve(&contract, &bet, Some(joiner), Winner::Joiner, 1).await;

        // then
        assert!(matches!(result, Err(MutationError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn prepare_resolve__resolver_picks_joiner__targets_joiner() {
        // given
        let creator = Address::repeat_byte(1);
        let joiner = Address::repeat_byte(2);
        let mut raw = sample_bet(5, creator, "Joined - bet", U256::from(1u64), 1);
        raw.joiner = joiner;
        let resolver = raw.resolver;
        let contract = FakeBetContract::with_bets(vec![raw.clone()]);
        let bet = BetView::from_raw(raw, Some(resolver));

        // when
        let call = prepare_resolve(&contract, &bet, Some(resolver), Winner::Joiner, 1)
            .await
            .unwrap();

        // then
        assert_eq!(call.winner, joiner);
        assert_eq!(call.bet_id, U256::from(5u64));
    }

    #[test]
    fn prepare_expiry_check__only_for_expired_open_bets() {
        // given
        let bet = open_bet(Address::repeat_byte(1));
        let me = Some(Address::repeat_byte(2));

        // then
        assert!(prepare_expiry_check(&bet, me, 0).is_err());
        assert_eq!(prepare_expiry_check(&bet, me, u64::MAX).unwrap(), bet.id);
    }

    #[tokio::test]
    async fn submit__rejected_by_wallet__maps_to_rejected() {
        // given
        let contract = FakeBetContract::default();
        contract.state().lock().unwrap().reject_writes = true;

        // when
        let result = submit(&contract, Mutation::CheckExpiry(U256::from(1u64))).await;

        // then
        assert!(matches!(result, Err(MutationError::Rejected)));
        assert!(contract.state().lock().unwrap().submitted.is_empty());
    }

    #[tokio::test]
    async fn submit__join__records_call() {
        // given
        let contract = FakeBetContract::default();
        let call = prepare_join(
            &open_bet(Address::repeat_byte(1)),
            Some(Address::repeat_byte(2)),
            7,
            0,
        )
        .unwrap();

        // when
        submit(&contract, Mutation::Join(call.clone())).await.unwrap();

        // then
        assert_eq!(
            contract.state().lock().unwrap().submitted,
            vec![Submitted::Join(call)]
        );
    }
}
