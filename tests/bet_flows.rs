#![allow(non_snake_case)]

use alloy::primitives::{
    Address,
    U256,
};
use betlink::{
    bets::{
        BetStatus,
        CategoryFilter,
        DashboardTab,
        Role,
        apply_filters,
    },
    contract::ContractError,
    fetch::{
        BetQuery,
        CancelToken,
        ListState,
        RetryOutcome,
        RetryPolicy,
        load,
        retry,
    },
    mutations::{
        CreateBetForm,
        Mutation,
        MutationError,
        Winner,
        prepare_join,
        prepare_resolve,
        submit,
    },
    test_helpers::{
        FakeBetContract,
        Submitted,
        sample_bet,
    },
};
use chrono::{
    TimeZone,
    Utc,
};
use std::time::Duration;

const CHAIN_ID: u64 = 420120001;

fn creator() -> Address {
    Address::repeat_byte(0x11)
}

fn joiner() -> Address {
    Address::repeat_byte(0x22)
}

fn resolver() -> Address {
    Address::repeat_byte(0xee)
}

fn market() -> FakeBetContract {
    let mut joined = sample_bet(2, creator(), "ETH flips BTC - by 2027", U256::from(5u64), 1);
    joined.joiner = joiner();
    let mut settled = sample_bet(3, creator(), "Election - winner", U256::from(4u64), 2);
    settled.joiner = joiner();
    settled.winner = joiner();
    FakeBetContract::with_bets(vec![
        sample_bet(1, creator(), "BTC above 100k - by year end", U256::from(3u64), 0),
        joined,
        settled,
        sample_bet(4, creator(), "Lakers win - NBA finals", U256::from(1u64), 0),
    ])
}

#[tokio::test]
async fn explore__search_then_join__submits_matching_stake() {
    // given
    let contract = market();
    let viewer = Some(joiner());
    let listing = load(&contract, &BetQuery::Explore { viewer }).await.unwrap();

    // when
    let found = apply_filters(&listing.bets, CategoryFilter::All, "btc above");
    let call = prepare_join(&found[0], viewer, CHAIN_ID, 0).unwrap();
    submit(&contract, Mutation::Join(call.clone())).await.unwrap();

    // then
    assert_eq!(listing.bets.len(), 3);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "BTC above 100k");
    assert_eq!(call.stake, U256::from(3u64));
    assert_eq!(
        contract.state().lock().unwrap().submitted,
        vec![Submitted::Join(call)]
    );
}

#[tokio::test]
async fn explore__search_without_match__is_empty() {
    // given
    let contract = market();
    let listing = load(&contract, &BetQuery::Explore { viewer: None })
        .await
        .unwrap();

    // when
    let found = apply_filters(&listing.bets, CategoryFilter::All, "no such market");

    // then
    assert!(found.is_empty());
    assert_eq!(
        apply_filters(&listing.bets, CategoryFilter::All, "").len(),
        listing.bets.len()
    );
}

#[tokio::test]
async fn create__valid_form__submits_composed_description() {
    // given
    let contract = market();
    let now = Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap();
    let form = CreateBetForm {
        title: "Rain in Lisbon".to_owned(),
        description: "On new year's day".to_owned(),
        amount: "0.5".to_owned(),
        expiry: "2027-01-01".to_owned(),
        resolver: resolver().to_string(),
    };

    // when
    let call = form.validate(now, CHAIN_ID).unwrap();
    let outcome = submit(&contract, Mutation::Create(call.clone())).await;

    // then
    assert!(outcome.is_ok());
    assert_eq!(call.description, "Rain in Lisbon - On new year's day");
    assert_eq!(call.resolver, resolver());
    assert_eq!(
        contract.state().lock().unwrap().submitted,
        vec![Submitted::Create(call)]
    );
}

#[tokio::test]
async fn resolve__designated_resolver__settles_for_chosen_winner() {
    // given
    let contract = market();
    let viewer = Some(resolver());
    let listing = load(&contract, &BetQuery::Resolve { viewer }).await.unwrap();
    let bet = &listing.bets[0];

    // when
    let call = prepare_resolve(&contract, bet, viewer, Winner::Creator, CHAIN_ID)
        .await
        .unwrap();
    submit(&contract, Mutation::Resolve(call.clone())).await.unwrap();

    // then
    assert_eq!(listing.bets.len(), 1);
    assert_eq!(bet.status, BetStatus::Joined);
    assert_eq!(bet.role, Role::Resolver);
    assert_eq!(call.winner, creator());
    assert_eq!(
        contract.state().lock().unwrap().submitted,
        vec![Submitted::Resolve(call)]
    );
}

#[tokio::test]
async fn resolve__contract_reverts__surfaces_reason() {
    // given
    let contract = market();
    contract.state().lock().unwrap().revert_reason = Some("BetNotActive".to_owned());
    let viewer = Some(resolver());
    let listing = load(&contract, &BetQuery::Resolve { viewer }).await.unwrap();
    let call = prepare_resolve(&contract, &listing.bets[0], viewer, Winner::Joiner, CHAIN_ID)
        .await
        .unwrap();

    // when
    let result = submit(&contract, Mutation::Resolve(call)).await;

    // then
    let Err(MutationError::Reverted(reason)) = result else {
        panic!("expected a revert, got {result:?}");
    };
    assert_eq!(reason, "BetNotActive");
    assert!(contract.state().lock().unwrap().submitted.is_empty());
}

#[tokio::test]
async fn dashboard__resolved_tab__lists_settled_bets_and_winnings() {
    // given
    let contract = market();
    let query = BetQuery::Dashboard {
        account: joiner(),
        tab: DashboardTab::Resolved,
    };

    // when
    let listing = load(&contract, &query).await.unwrap();

    // then
    assert_eq!(listing.bets.len(), 1);
    assert_eq!(listing.bets[0].id, U256::from(3u64));
    let portfolio = listing.portfolio.unwrap();
    assert_eq!(portfolio.won_count, 1);
    assert_eq!(portfolio.winnings, U256::from(8u64));
    assert_eq!(portfolio.locked, U256::from(5u64));
}

#[tokio::test]
async fn load__unreachable_rpc__fails_with_connection_message() {
    // given
    let contract = market();
    contract.state().lock().unwrap().unreachable = true;

    // when
    let err = load(&contract, &BetQuery::Explore { viewer: None })
        .await
        .unwrap_err();

    // then
    assert!(matches!(err, ContractError::Unreachable));
    let state = ListState::failed(&err);
    assert_eq!(
        state,
        ListState::Failed {
            message: "Failed to connect to RPC provider. Please check your internet connection."
                .to_owned()
        }
    );
    assert!(state.bets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry__transient_failures__recovers_before_budget_runs_out() {
    // given
    let contract = market();
    contract.state().lock().unwrap().failures_remaining = 2;
    let policy = RetryPolicy {
        max_retries: 3,
        delay: Duration::from_secs(2),
    };
    let token = CancelToken::new();
    let mut retries = Vec::new();
    let query = BetQuery::Explore { viewer: None };

    // when
    let outcome = retry(&policy, &token, |n| retries.push(n), || load(&contract, &query)).await;

    // then
    let RetryOutcome::Done(listing) = outcome else {
        panic!("expected the listing after retries");
    };
    assert_eq!(listing.bets.len(), 3);
    assert_eq!(retries, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn retry__cancelled_before_start__never_calls_contract() {
    // given
    let contract = market();
    let token = CancelToken::new();
    token.cancel();

    // when
    let outcome = retry(
        &RetryPolicy::default(),
        &token,
        |_| {},
        || load(&contract, &BetQuery::Explore { viewer: None }),
    )
    .await;

    // then
    assert!(matches!(outcome, RetryOutcome::Cancelled));
    assert_eq!(contract.state().lock().unwrap().read_calls, 0);
}
