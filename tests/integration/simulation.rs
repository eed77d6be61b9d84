//! End-to-end session simulations.
//!
//! Drives full sessions (controller, scheduler, tracker, runner) against the
//! scripted platform and checks stakes, totals, and halting.

use chrono::{Duration as ChronoDuration, Local, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use autotrader::engine::{
    run_session, ExecutionScheduler, RetryPolicy, SessionConfig, SessionController, StopListener,
    StopSignal, TimingTracker,
};
use autotrader::signals::{CsvSignalSource, VecSignalSource};
use autotrader::storage::{self, SessionJournal};
use autotrader::strategy::{ManualLeg, ManualSequence, Policy, StrategyConfig};
use autotrader::types::{
    Direction, HaltReason, SessionStatus, Signal, TradeOutcome, TraderError,
};

use crate::mock_platform::{Scripted, ScriptedPlatform};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        backoff: Duration::from_millis(10),
    }
}

fn make_strategy(policy: Policy, base: Decimal, mult: Decimal, max: Option<Decimal>) -> StrategyConfig {
    StrategyConfig {
        policy,
        base_amount: base,
        multiplier: mult,
        max_stake: max,
    }
}

async fn make_session(
    platform: Arc<ScriptedPlatform>,
    tracker: Arc<TimingTracker>,
    strategy: StrategyConfig,
    config: SessionConfig,
    stop: StopListener,
) -> SessionController {
    let scheduler = ExecutionScheduler::new(platform, tracker, fast_retry());
    let mut controller = SessionController::new("sim", &strategy, config, scheduler, stop).unwrap();
    controller.refresh_assets().await.unwrap();
    controller
}

/// A signal whose fire time has already passed, so it executes at once.
fn due_signal(asset: &str) -> Signal {
    Signal::new(asset, Direction::Call, Utc::now(), 60)
}

#[tokio::test]
async fn test_consecutive_wins_stay_at_base() {
    let platform = Arc::new(ScriptedPlatform::outcomes(&[TradeOutcome::Win, TradeOutcome::Win]));
    let mut session = make_session(
        Arc::clone(&platform),
        Arc::new(TimingTracker::default()),
        make_strategy(Policy::Cumulative3Cycle, dec!(1.00), dec!(2.5), None),
        SessionConfig::default(),
        StopListener::never(),
    )
    .await;

    session.submit_signal(due_signal("EURUSD_otc")).await.unwrap();
    assert_eq!(session.strategy().next_stake(), dec!(1.00));
    assert_eq!(session.strategy().state().position(), 1);
    session.submit_signal(due_signal("EURUSD_otc")).await.unwrap();

    assert_eq!(platform.stakes(), vec![dec!(1.00), dec!(1.00)]);
    assert_eq!(session.current_status().net_profit, dec!(1.60));
}

#[tokio::test]
async fn test_reset_2cycle_second_cycle_starts_at_base() {
    let platform = Arc::new(ScriptedPlatform::outcomes(&[
        TradeOutcome::Loss,
        TradeOutcome::Loss,
        TradeOutcome::Win,
    ]));
    let mut session = make_session(
        Arc::clone(&platform),
        Arc::new(TimingTracker::default()),
        make_strategy(Policy::Reset2Cycle, dec!(1.00), dec!(2.5), Some(dec!(100))),
        SessionConfig::default(),
        StopListener::never(),
    )
    .await;

    session.submit_signal(due_signal("EURUSD_otc")).await.unwrap();
    session.submit_signal(due_signal("EURUSD_otc")).await.unwrap();
    assert!(session.strategy().is_cycle_complete());
    assert_eq!(session.strategy().state().cycle_index, 2);
    assert_eq!(session.strategy().state().step_index, 1);

    let result = session.submit_signal(due_signal("EURUSD_otc")).await.unwrap();
    assert_eq!(result.attempt.stake_amount, dec!(1.00));
    assert_eq!(platform.stakes(), vec![dec!(1.00), dec!(2.50), dec!(1.00)]);

    let totals = session.current_status();
    assert_eq!(totals.losses, 2);
    assert_eq!(totals.wins, 1);
    assert_eq!(totals.net_profit, dec!(-2.70));
}

#[tokio::test]
async fn test_cumulative_nine_losses_then_reset() {
    let platform = Arc::new(ScriptedPlatform::outcomes(&[]));
    let mut session = make_session(
        Arc::clone(&platform),
        Arc::new(TimingTracker::default()),
        make_strategy(Policy::Cumulative3Cycle, dec!(1.00), dec!(2.5), None),
        SessionConfig::default(),
        StopListener::never(),
    )
    .await;

    for _ in 0..10 {
        session.submit_signal(due_signal("EURUSD_otc")).await.unwrap();
    }

    assert_eq!(
        platform.stakes(),
        vec![
            dec!(1.00),
            dec!(2.50),
            dec!(6.25),
            dec!(15.63),
            dec!(39.06),
            dec!(97.66),
            dec!(244.14),
            dec!(610.35),
            dec!(1525.88),
            dec!(1.00),
        ]
    );
    assert_eq!(session.current_status().losses, 10);
}

#[tokio::test]
async fn test_stop_loss_halts_session() {
    let platform = Arc::new(ScriptedPlatform::outcomes(&[TradeOutcome::Loss, TradeOutcome::Loss]));
    let mut session = make_session(
        Arc::clone(&platform),
        Arc::new(TimingTracker::default()),
        make_strategy(Policy::Reset2Cycle, dec!(20), dec!(1.6), Some(dec!(100))),
        SessionConfig {
            stop_loss: Some(dec!(50)),
            ..Default::default()
        },
        StopListener::never(),
    )
    .await;

    session.submit_signal(due_signal("EURUSD_otc")).await.unwrap();
    session.submit_signal(due_signal("EURUSD_otc")).await.unwrap();

    assert_eq!(platform.stakes(), vec![dec!(20), dec!(32)]);
    assert_eq!(session.current_status().net_profit, dec!(-52));
    assert_eq!(session.status(), SessionStatus::Halted(HaltReason::StopLoss));

    let err = session.submit_signal(due_signal("EURUSD_otc")).await.unwrap_err();
    assert_eq!(err, TraderError::SessionHalted(HaltReason::StopLoss));
    assert_eq!(platform.orders().len(), 2);
}

#[tokio::test]
async fn test_transient_error_retried_once() {
    let platform = Arc::new(ScriptedPlatform::new(vec![
        Scripted::Transient("connection reset"),
        Scripted::Settle(TradeOutcome::Loss),
    ]));
    let tracker = Arc::new(TimingTracker::default());
    let mut session = make_session(
        Arc::clone(&platform),
        Arc::clone(&tracker),
        make_strategy(Policy::Cumulative3Cycle, dec!(1), dec!(2.5), None),
        SessionConfig::default(),
        StopListener::never(),
    )
    .await;

    let result = session.submit_signal(due_signal("EURUSD_otc")).await.unwrap();

    assert_eq!(result.attempt.retries, 1);
    assert_eq!(result.outcome, TradeOutcome::Loss);
    assert_eq!(session.current_status().trades_placed, 1);
    assert_eq!(session.current_status().errors, 0);
    assert_eq!(platform.orders().len(), 2);
    assert_eq!(tracker.sample_count(60), 1);
}

#[tokio::test]
async fn test_rejected_order_is_error_without_progression() {
    let platform = Arc::new(ScriptedPlatform::new(vec![Scripted::Reject("asset closed")]));
    let mut session = make_session(
        Arc::clone(&platform),
        Arc::new(TimingTracker::default()),
        make_strategy(Policy::Cumulative3Cycle, dec!(1), dec!(2.5), None),
        SessionConfig::default(),
        StopListener::never(),
    )
    .await;

    let result = session.submit_signal(due_signal("EURUSD_otc")).await.unwrap();
    assert_eq!(result.outcome, TradeOutcome::Error);
    assert_eq!(platform.orders().len(), 1);
    assert_eq!(session.current_status().errors, 1);
    assert_eq!(session.current_status().trades_placed, 0);
    assert_eq!(session.strategy().next_stake(), dec!(1));
}

#[tokio::test]
async fn test_unavailable_asset_never_reaches_platform() {
    let platform = Arc::new(ScriptedPlatform::outcomes(&[]));
    let mut session = make_session(
        Arc::clone(&platform),
        Arc::new(TimingTracker::default()),
        make_strategy(Policy::Reset2Cycle, dec!(5), dec!(2), None),
        SessionConfig::default(),
        StopListener::never(),
    )
    .await;

    let err = session.submit_signal(due_signal("XAUUSD_otc")).await.unwrap_err();
    assert_eq!(err, TraderError::AssetUnavailable("XAUUSD_otc".into()));
    assert!(platform.orders().is_empty());
    assert_eq!(session.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn test_manual_sequence_switches_leg_on_cycle_two() {
    let platform = Arc::new(ScriptedPlatform::outcomes(&[
        TradeOutcome::Loss,
        TradeOutcome::Loss,
        TradeOutcome::Win,
        TradeOutcome::Loss,
    ]));
    let mut session = make_session(
        Arc::clone(&platform),
        Arc::new(TimingTracker::default()),
        make_strategy(Policy::Manual2Cycle, dec!(10), dec!(2), None),
        SessionConfig::default(),
        StopListener::never(),
    )
    .await;
    let sequence = ManualSequence {
        cycle_one: ManualLeg {
            asset: "EURUSD_otc".into(),
            direction: Direction::Call,
        },
        cycle_two: ManualLeg {
            asset: "AUDCAD_otc".into(),
            direction: Direction::Put,
        },
    };

    for _ in 0..4 {
        session.submit_manual(&sequence, Utc::now(), 60).await.unwrap();
    }

    let orders = platform.orders();
    let legs: Vec<(&str, Direction, Decimal)> = orders
        .iter()
        .map(|o| (o.asset.as_str(), o.direction, o.amount))
        .collect();
    assert_eq!(
        legs,
        vec![
            ("EURUSD_otc", Direction::Call, dec!(10)),
            ("EURUSD_otc", Direction::Call, dec!(20)),
            ("AUDCAD_otc", Direction::Put, dec!(10)),
            ("EURUSD_otc", Direction::Call, dec!(10)),
        ]
    );
}

#[tokio::test]
async fn test_csv_feed_through_runner() {
    let yesterday = Local::now().date_naive() - ChronoDuration::days(1);
    let feed = "\
message_text,is_signal,asset,direction,signal_time,duration
EURUSD-OTC CALL 09:00,Yes,EURUSD-OTC,call,09:00,60
hello,No,,,,
GBPUSD-OTCp PUT 09:05,Yes,GBPUSD-OTCp,put,09:05,60
XAUUSD CALL 09:10,Yes,XAUUSD,call,09:10,60
";
    let mut source = CsvSignalSource::from_reader(feed.as_bytes(), 60).on_date(yesterday);
    let platform = Arc::new(ScriptedPlatform::outcomes(&[TradeOutcome::Loss, TradeOutcome::Win]));
    let mut session = make_session(
        Arc::clone(&platform),
        Arc::new(TimingTracker::default()),
        make_strategy(Policy::Cumulative3Cycle, dec!(1), dec!(2), None),
        SessionConfig::default(),
        StopListener::never(),
    )
    .await;

    let totals = run_session(&mut session, &mut source, StopListener::never()).await;

    assert_eq!(totals.trades_placed, 2);
    assert_eq!(totals.wins, 1);
    assert_eq!(totals.losses, 1);
    // -1, then +2 * 0.8
    assert_eq!(totals.net_profit, dec!(0.6));
    assert!(session.history().iter().all(|r| r.attempt.late));
    assert_eq!(session.status(), SessionStatus::Halted(HaltReason::SignalsExhausted));
    assert_eq!(platform.orders()[1].asset, "GBPUSD_otc");
}

#[tokio::test]
async fn test_stale_signals_skipped_when_lateness_capped() {
    let platform = Arc::new(ScriptedPlatform::outcomes(&[TradeOutcome::Win]));
    let mut session = make_session(
        Arc::clone(&platform),
        Arc::new(TimingTracker::default()),
        make_strategy(Policy::Reset2Cycle, dec!(1), dec!(2), None),
        SessionConfig {
            max_signal_lateness_secs: Some(30.0),
            ..Default::default()
        },
        StopListener::never(),
    )
    .await;
    let mut source = VecSignalSource::new(vec![
        Signal::new("EURUSD_otc", Direction::Call, Utc::now() - ChronoDuration::minutes(5), 60),
        due_signal("EURUSD_otc"),
    ]);

    let totals = run_session(&mut session, &mut source, StopListener::never()).await;

    assert_eq!(totals.trades_placed, 1);
    assert_eq!(platform.orders().len(), 1);
}

#[tokio::test]
async fn test_stop_cancels_pending_signal() {
    let platform = Arc::new(ScriptedPlatform::outcomes(&[]));
    let (stop, listener) = StopSignal::new();
    let mut session = make_session(
        Arc::clone(&platform),
        Arc::new(TimingTracker::default()),
        make_strategy(Policy::Reset2Cycle, dec!(1), dec!(2), None),
        SessionConfig::default(),
        listener.clone(),
    )
    .await;
    let mut source = VecSignalSource::new(vec![Signal::new(
        "EURUSD_otc",
        Direction::Put,
        Utc::now() + ChronoDuration::seconds(60),
        60,
    )]);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.stop();
    });

    let totals = tokio::time::timeout(
        Duration::from_secs(5),
        run_session(&mut session, &mut source, listener),
    )
    .await
    .expect("stop should end the session");

    assert_eq!(totals.trades_placed, 0);
    assert!(platform.orders().is_empty());
    assert_eq!(session.status(), SessionStatus::Halted(HaltReason::Stopped));
}

#[tokio::test]
async fn test_concurrent_sessions_share_tracker() {
    let tracker = Arc::new(TimingTracker::default());
    let mut handles = Vec::new();

    for _ in 0..3 {
        let platform = Arc::new(
            ScriptedPlatform::outcomes(&[TradeOutcome::Win; 4]).with_delay(Duration::from_millis(5)),
        );
        let mut session = make_session(
            platform,
            Arc::clone(&tracker),
            make_strategy(Policy::Reset2Cycle, dec!(1), dec!(2), None),
            SessionConfig::default(),
            StopListener::never(),
        )
        .await;
        handles.push(tokio::spawn(async move {
            let mut source = VecSignalSource::new((0..4).map(|_| due_signal("EURUSD_otc")).collect());
            run_session(&mut session, &mut source, StopListener::never()).await
        }));
    }

    let results = futures::future::join_all(handles).await;
    let placed: u64 = results.into_iter().map(|r| r.unwrap().trades_placed).sum();

    assert_eq!(placed, 12);
    assert_eq!(tracker.sample_count(60), 10); // window size
    assert_eq!(tracker.average_latency(60), 0.0); // overhead below zero is floored
}

#[tokio::test]
async fn test_journal_written_after_run() {
    let platform = Arc::new(ScriptedPlatform::outcomes(&[TradeOutcome::Loss, TradeOutcome::Draw]));
    let mut session = make_session(
        Arc::clone(&platform),
        Arc::new(TimingTracker::default()),
        make_strategy(Policy::Cumulative3Cycle, dec!(1), dec!(2.5), None),
        SessionConfig::default(),
        StopListener::never(),
    )
    .await;
    let mut source = VecSignalSource::new(vec![due_signal("EURUSD_otc"), due_signal("EURUSD_otc")]);
    run_session(&mut session, &mut source, StopListener::never()).await;

    let path = std::env::temp_dir()
        .join(format!("autotrader_sim_journal_{}.json", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();
    storage::save_journal(&SessionJournal::from_controller(&session), Some(&path)).unwrap();
    let loaded = storage::load_journal(Some(&path)).unwrap().unwrap();

    assert_eq!(loaded.history.len(), 2);
    assert_eq!(loaded.totals.draws, 1);
    assert_eq!(loaded.strategy.step_index, 2);
    assert_eq!(loaded.status, SessionStatus::Halted(HaltReason::SignalsExhausted));

    storage::delete_journal(Some(&path)).unwrap();
}
