//! End-to-end session behaviour against the simulated staking contract.

use std::time::Duration;

use staker_common::{
    parse_ether, Address, Amount, AmountError, BalanceProvider, ContractStateView, GasTier,
    ReadBehavior, SimulatedStaker, StateField, STAKE_EVENT,
};
use staker_dashboard::{
    Collaborators, DashboardSession, DashboardSnapshot, FeedError, FeedSettings,
    SessionSettings, SubmitError, TimeBreakdown, TxFailure,
};

// ════════════════════════════════════════════════════════════════════════════
// HELPERS
// ════════════════════════════════════════════════════════════════════════════

fn alice() -> Address {
    Address::from([0xA1; 20])
}

fn ether(s: &str) -> Amount {
    parse_ether(s).unwrap_or_else(|e| panic!("{}", e))
}

fn settings(account: Address) -> SessionSettings {
    SessionSettings {
        account,
        gas_tier: GasTier::Fast,
        feed: FeedSettings {
            event_name: STAKE_EVENT.to_string(),
            window: 10,
            from_block: 1,
            resubscribe_delay: Duration::from_millis(10),
        },
        balance_poll_interval: Duration::from_millis(10),
        refresh_interval: None,
        fetch_timeout: None,
        stake_value: ether("0.5"),
        decimals: 18,
    }
}

fn funded_chain() -> SimulatedStaker {
    let chain = SimulatedStaker::new(ether("1"), 90_061);
    chain.fund(alice(), ether("10"));
    chain
}

fn start(chain: &SimulatedStaker, signed: bool) -> DashboardSession {
    let signer = if signed { Some(alice()) } else { None };
    DashboardSession::start(Collaborators::simulated(chain, signer), settings(alice()))
        .unwrap_or_else(|e| panic!("start: {}", e))
}

/// Polls `check` against the current view until it holds or two seconds pass.
async fn wait_for_view<F>(session: &DashboardSession, check: F) -> ContractStateView
where
    F: Fn(&ContractStateView) -> bool,
{
    for _ in 0..200 {
        let view = session.view();
        if check(&view) {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("view never satisfied condition: {:?}", session.view());
}

/// Polls `check` against fresh snapshots until it holds or two seconds pass.
async fn wait_for_snapshot<F>(session: &DashboardSession, check: F) -> DashboardSnapshot
where
    F: Fn(&DashboardSnapshot) -> bool,
{
    for _ in 0..200 {
        let snap = session.snapshot();
        if check(&snap) {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("snapshot never satisfied condition: {:?}", session.snapshot());
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

// ── Test 1: initial sync fills the view and the countdown ───────────────

#[tokio::test]
async fn initial_sync_populates_snapshot() {
    let chain = funded_chain();
    let session = start(&chain, false);

    wait_for_view(&session, |v| v.seconds_left.is_some() && v.threshold.is_some()).await;
    let snap = session.snapshot();
    assert_eq!(snap.view.threshold, Some(ether("1")));
    assert_eq!(snap.view.balance_staked, Some(Amount::ZERO));
    assert_eq!(snap.countdown, TimeBreakdown::from_seconds(90_061));
    assert_eq!(snap.countdown.days, "1");
    assert!(snap.recent_events.is_empty());

    session.shutdown().await;
}

// ── Test 2: staking shows up in the feed and, via the balance trigger, in the view

#[tokio::test]
async fn stake_flows_into_feed_and_view() {
    let chain = funded_chain();
    let session = start(&chain, true);
    wait_for_view(&session, |v| v.balance_staked.is_some()).await;

    let outcome = session
        .stake_fixed()
        .await
        .unwrap_or_else(|e| panic!("stake: {}", e));

    let view = wait_for_view(&session, |v| v.balance_staked == Some(ether("0.5"))).await;
    assert_eq!(view.threshold, Some(ether("1")));

    for _ in 0..200 {
        if !session.snapshot().recent_events.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let events = session.snapshot().recent_events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].block_number, outcome.block_number);
    assert_eq!(events[0].sender, alice());
    assert_eq!(events[0].amount, ether("0.5"));

    session.shutdown().await;
}

// ── Test 3: custom amounts are validated at the boundary ────────────────

#[tokio::test]
async fn send_ether_validates_input() {
    let chain = funded_chain();
    let session = start(&chain, true);

    assert_eq!(
        session.send_ether("0").await,
        Err(SubmitError::InvalidAmountInput(AmountError::Zero))
    );
    assert_eq!(
        session.send_ether("").await,
        Err(SubmitError::InvalidAmountInput(AmountError::Empty))
    );
    assert!(matches!(
        session.send_ether("1,5").await,
        Err(SubmitError::InvalidAmountInput(AmountError::Malformed(_)))
    ));
    assert_eq!(chain.sends(), 0);
    assert_eq!(chain.gas_lookups(), 0);

    session
        .send_ether("1.5")
        .await
        .unwrap_or_else(|e| panic!("send: {}", e));
    assert_eq!(chain.stake_of(alice()), ether("1.5"));

    session.shutdown().await;
}

// ── Test 4: read-only session refuses every write ───────────────────────

#[tokio::test]
async fn no_signer_refuses_actions() {
    let chain = funded_chain();
    let session = start(&chain, false);

    assert_eq!(session.execute().await, Err(SubmitError::NoSignerAvailable));
    assert_eq!(session.withdraw().await, Err(SubmitError::NoSignerAvailable));
    assert_eq!(session.stake_fixed().await, Err(SubmitError::NoSignerAvailable));
    assert_eq!(
        session.send_ether("0.1").await,
        Err(SubmitError::NoSignerAvailable)
    );
    assert_eq!(chain.gas_lookups(), 0);
    assert_eq!(chain.sends(), 0);

    session.shutdown().await;
}

// ── Test 5: deadline, execute and completion ────────────────────────────

#[tokio::test]
async fn execute_after_deadline_completes() {
    let chain = funded_chain();
    let session = start(&chain, true);

    session
        .send_ether("1")
        .await
        .unwrap_or_else(|e| panic!("send: {}", e));

    let early = session.execute().await;
    assert!(matches!(
        early,
        Err(SubmitError::TransactionFailed(TxFailure::Reverted { .. }))
    ));

    chain.advance_time(90_061);
    session
        .execute()
        .await
        .unwrap_or_else(|e| panic!("execute: {}", e));

    // execute() moves no value, so ask for the refresh explicitly.
    let report = session.refresh_now().await;
    assert!(report.is_complete(), "report: {:?}", report);

    let snap = session.snapshot();
    assert!(snap.view.completed);
    assert_eq!(snap.view.seconds_left, Some(0));
    assert_eq!(snap.countdown, TimeBreakdown::from_seconds(0));
    assert!(snap.countdown.is_known());

    session.shutdown().await;
}

// ── Test 6: missed threshold opens withdrawals ──────────────────────────

#[tokio::test]
async fn withdraw_after_missed_threshold() {
    let chain = funded_chain();
    let session = start(&chain, true);

    session
        .stake_fixed()
        .await
        .unwrap_or_else(|e| panic!("stake: {}", e));
    chain.advance_time(90_061);
    session
        .execute()
        .await
        .unwrap_or_else(|e| panic!("execute: {}", e));
    session
        .withdraw()
        .await
        .unwrap_or_else(|e| panic!("withdraw: {}", e));

    assert_eq!(chain.stake_of(alice()), Amount::ZERO);
    // The refund lands back in the account.
    assert_eq!(chain.balance_of(alice()).await, Ok(ether("10")));
    let view = wait_for_view(&session, |v| v.balance_staked == Some(Amount::ZERO)).await;
    assert!(!view.completed);
    let snap = wait_for_snapshot(&session, |s| s.pool.total_staked == Some(Amount::ZERO)).await;
    assert_eq!(snap.pool.external_balance, Some(Amount::ZERO));

    session.shutdown().await;
}

// ── Test 7: a failing field stays at its last value ─────────────────────

#[tokio::test]
async fn failed_field_keeps_last_value() {
    let chain = funded_chain();
    let session = start(&chain, false);
    wait_for_view(&session, |v| v.threshold.is_some() && v.seconds_left.is_some()).await;

    chain.set_read_behavior(StateField::Threshold, ReadBehavior::Fail);
    chain.set_threshold(ether("7"));
    chain.advance_time(61);

    let report = session.refresh_now().await;
    assert_eq!(report.failed.len(), 1);

    let view = session.view();
    assert_eq!(view.threshold, Some(ether("1")));
    assert_eq!(view.seconds_left, Some(90_000));
    assert!(session.metrics().snapshot().fetch_failures >= 1);

    session.shutdown().await;
}

// ── Test 8: teardown with a hung read; events keep flowing meanwhile ────

#[tokio::test]
async fn shutdown_releases_hung_reads() {
    let chain = funded_chain();
    chain.set_read_behavior(StateField::SecondsLeft, ReadBehavior::Hang);
    let session = start(&chain, true);

    wait_for_view(&session, |v| v.threshold.is_some()).await;
    let snap = session.snapshot();
    assert_eq!(snap.countdown, TimeBreakdown::unknown());

    // timeLeft() is still pending; the feed and the write path are not held up.
    let outcome = session
        .stake_fixed()
        .await
        .unwrap_or_else(|e| panic!("stake: {}", e));
    let snap = wait_for_snapshot(&session, |s| !s.recent_events.is_empty()).await;
    assert_eq!(snap.recent_events[0].block_number, outcome.block_number);
    assert_eq!(snap.countdown, TimeBreakdown::unknown());
    wait_for_view(&session, |v| v.balance_staked == Some(ether("0.5"))).await;
    assert_eq!(chain.read_calls(StateField::SecondsLeft), 1);

    tokio::time::timeout(Duration::from_secs(2), session.shutdown())
        .await
        .unwrap_or_else(|_| panic!("shutdown hung"));
}

// ── Test 9: unknown event name fails the start ──────────────────────────

#[tokio::test]
async fn unknown_event_name_fails_start() {
    let chain = funded_chain();
    let mut s = settings(alice());
    s.feed.event_name = "Withdrawn".to_string();

    let res = DashboardSession::start(Collaborators::simulated(&chain, None), s);
    assert!(matches!(res, Err(FeedError::Subscribe(_))));
}

// ── Test 10: pool figures, fiat value and the completion balance ────────

#[tokio::test]
async fn pool_figures_track_stake_and_completion() {
    let chain = funded_chain();
    let session = start(&chain, true);

    session
        .stake_fixed()
        .await
        .unwrap_or_else(|e| panic!("stake: {}", e));
    let snap = wait_for_snapshot(&session, |s| {
        s.pool.total_staked == Some(ether("0.5")) && s.your_staked_usd.is_some()
    })
    .await;
    // 0.5 at the simulated 2000 USD.
    assert_eq!(snap.your_staked_usd, Some(1_000.0));
    assert_eq!(snap.pool.native_price_usd, Some(2_000.0));

    session
        .send_ether("0.5")
        .await
        .unwrap_or_else(|e| panic!("send: {}", e));
    chain.advance_time(90_061);
    session
        .execute()
        .await
        .unwrap_or_else(|e| panic!("execute: {}", e));
    session.refresh_now().await;

    let snap = wait_for_snapshot(&session, |s| s.pool.external_balance == Some(ether("1"))).await;
    assert!(snap.view.completed);
    assert_eq!(snap.pool.total_staked, Some(Amount::ZERO));
    assert_eq!(session.contracts(), chain.addresses());

    session.shutdown().await;
}

// ── Test 11: price feed outage hides only the fiat value ────────────────

#[tokio::test]
async fn missing_price_hides_fiat_value() {
    let chain = funded_chain();
    chain.set_native_price(None);
    let session = start(&chain, false);

    let snap = wait_for_snapshot(&session, |s| {
        s.view.balance_staked.is_some() && s.pool.total_staked.is_some()
    })
    .await;
    assert_eq!(snap.pool.native_price_usd, None);
    assert_eq!(snap.your_staked_usd, None);
    assert!(session.metrics().snapshot().display_fetch_failures >= 1);

    session.shutdown().await;
}

// ── Test 12: event senders display by name when one is registered ──────

#[tokio::test]
async fn display_name_falls_back_to_address() {
    let chain = funded_chain();
    let bob = Address::from([0xB0; 20]);
    chain.register_name(alice(), "alice.eth");
    let session = start(&chain, false);

    assert_eq!(session.display_name(alice()).await, "alice.eth");
    assert_eq!(session.display_name(bob).await, bob.to_string());

    let mut collaborators = Collaborators::simulated(&chain, None);
    collaborators.names = None;
    let unnamed = DashboardSession::start(collaborators, settings(alice()))
        .unwrap_or_else(|e| panic!("start: {}", e));
    assert_eq!(unnamed.display_name(alice()).await, alice().to_string());

    unnamed.shutdown().await;
    session.shutdown().await;
}
