//! Session controller.
//!
//! Owns one martingale strategy and the running totals of a session. Each
//! signal is validated, sized by the strategy, handed to the scheduler, and
//! its result reconciled into the totals before the stop-loss/take-profit
//! thresholds are checked.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::engine::scheduler::{ExecutionScheduler, TradeRequest};
use crate::engine::stop::StopListener;
use crate::strategy::{ManualSequence, MartingaleStrategy, StrategyConfig};
use crate::types::{
    HaltReason, SessionStatus, SessionTotals, Signal, TradeOutcome, TradeResult, TraderError,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Halt once net profit falls to `-stop_loss` or below.
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    /// Halt once net profit reaches `take_profit`.
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    /// Trade assets missing from the availability list (with a warning).
    #[serde(default)]
    pub allow_unknown_assets: bool,
    /// Reject signals this many seconds past their target time.
    #[serde(default)]
    pub max_signal_lateness_secs: Option<f64>,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), TraderError> {
        for (name, limit) in [("stop_loss", self.stop_loss), ("take_profit", self.take_profit)] {
            if let Some(limit) = limit {
                if limit <= Decimal::ZERO {
                    return Err(TraderError::Config(format!(
                        "{name} must be positive, got {limit}"
                    )));
                }
            }
        }
        if let Some(secs) = self.max_signal_lateness_secs {
            if secs < 0.0 {
                return Err(TraderError::Config(format!(
                    "max_signal_lateness_secs must not be negative, got {secs}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct SessionController {
    name: String,
    config: SessionConfig,
    strategy: MartingaleStrategy,
    scheduler: ExecutionScheduler,
    totals: SessionTotals,
    status: SessionStatus,
    assets: HashSet<String>,
    history: Vec<TradeResult>,
    stop: StopListener,
}

impl SessionController {
    pub fn new(
        name: impl Into<String>,
        strategy_config: &StrategyConfig,
        config: SessionConfig,
        scheduler: ExecutionScheduler,
        stop: StopListener,
    ) -> Result<Self, TraderError> {
        strategy_config.validate()?;
        config.validate()?;

        Ok(Self {
            name: name.into(),
            strategy: MartingaleStrategy::new(strategy_config),
            scheduler,
            totals: SessionTotals::new(config.stop_loss, config.take_profit),
            status: SessionStatus::Idle,
            assets: HashSet::new(),
            history: Vec::new(),
            stop,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the running totals.
    pub fn current_status(&self) -> SessionTotals {
        self.totals.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Every result in submission order.
    pub fn history(&self) -> &[TradeResult] {
        &self.history
    }

    pub fn strategy(&self) -> &MartingaleStrategy {
        &self.strategy
    }

    pub fn set_available_assets<I, S>(&mut self, assets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets = assets.into_iter().map(Into::into).collect();
    }

    /// Pull the open asset list from the platform. Returns how many are open.
    pub async fn refresh_assets(&mut self) -> Result<usize, TraderError> {
        let assets = self
            .scheduler
            .platform()
            .available_assets()
            .await
            .map_err(|e| TraderError::TransientExecution(e.to_string()))?;
        debug!(session = %self.name, count = assets.len(), "Asset list refreshed");
        self.assets = assets;
        Ok(self.assets.len())
    }

    /// Stop accepting signals. The first reason sticks.
    pub fn halt(&mut self, reason: HaltReason) {
        if self.status.is_halted() {
            return;
        }
        self.status = SessionStatus::Halted(reason);
        info!(
            session = %self.name,
            reason = %reason,
            trades = self.totals.trades_placed,
            net = format!("${:.2}", self.totals.net_profit),
            "Session halted"
        );
    }

    /// Validate a signal, trade it, and fold the result into the session.
    pub async fn submit_signal(&mut self, signal: Signal) -> Result<TradeResult, TraderError> {
        if let SessionStatus::Halted(reason) = self.status {
            return Err(TraderError::SessionHalted(reason));
        }
        if self.stop.is_stopped() {
            return Err(TraderError::Cancelled);
        }

        if let Some(max_late) = self.config.max_signal_lateness_secs {
            let late_secs = signal.lateness_secs(Utc::now());
            if late_secs > max_late {
                return Err(TraderError::SignalExpired {
                    asset: signal.asset,
                    late_secs,
                });
            }
        }

        if !self.assets.contains(&signal.asset) {
            if !self.config.allow_unknown_assets {
                return Err(TraderError::AssetUnavailable(signal.asset));
            }
            warn!(session = %self.name, asset = %signal.asset, "Asset not in availability list, trading anyway");
        }

        if self.status == SessionStatus::Idle {
            info!(session = %self.name, policy = %self.strategy.policy(), "Session active");
            self.status = SessionStatus::Active;
        }

        let stake = self.strategy.next_stake();
        let state = self.strategy.state();
        debug!(
            session = %self.name,
            signal = %signal,
            stake = format!("${:.2}", stake),
            cycle = state.cycle_index,
            step = state.step_index,
            "Submitting signal"
        );

        let request = TradeRequest {
            asset: signal.asset,
            direction: signal.direction,
            stake,
            duration_secs: signal.requested_duration,
            target_time: signal.target_time,
        };
        let result = self
            .scheduler
            .schedule_and_execute(request, &mut self.stop)
            .await?;

        self.reconcile(&result);
        self.history.push(result.clone());
        Ok(result)
    }

    /// Trade the leg of `sequence` matching the strategy's current cycle.
    pub async fn submit_manual(
        &mut self,
        sequence: &ManualSequence,
        target_time: DateTime<Utc>,
        duration_secs: u32,
    ) -> Result<TradeResult, TraderError> {
        let leg = sequence.leg_for(self.strategy.state().cycle_index);
        let mut signal = Signal::new(leg.asset.clone(), leg.direction, target_time, duration_secs);
        signal.source_text = format!("manual cycle {}", self.strategy.state().cycle_index);
        self.submit_signal(signal).await
    }

    /// Apply one result to totals and strategy, then check thresholds.
    fn reconcile(&mut self, result: &TradeResult) {
        let totals = &mut self.totals;
        match result.outcome {
            TradeOutcome::Win => {
                totals.trades_placed += 1;
                totals.wins += 1;
            }
            TradeOutcome::Loss => {
                totals.trades_placed += 1;
                totals.losses += 1;
            }
            TradeOutcome::Draw => {
                totals.trades_placed += 1;
                totals.draws += 1;
            }
            TradeOutcome::Error => totals.errors += 1,
        }
        totals.net_profit += result.net_pnl();

        match self.strategy.record_outcome(result.outcome) {
            Ok(_) => {}
            Err(TraderError::StakeLimitExceeded { stake, limit }) => {
                self.totals.stake_limit_resets += 1;
                warn!(
                    session = %self.name,
                    stake = format!("${:.2}", stake),
                    limit = format!("${:.2}", limit),
                    "Stake limit hit, sequence reset to base"
                );
            }
            Err(e) => warn!(session = %self.name, error = %e, "Strategy update failed"),
        }

        info!(
            session = %self.name,
            outcome = %result.outcome,
            pnl = format!("{:+.2}", result.net_pnl()),
            net = format!("${:.2}", self.totals.net_profit),
            next_stake = format!("${:.2}", self.strategy.next_stake()),
            "Result reconciled"
        );

        if let Some(reason) = self.totals.threshold_crossed() {
            self.halt(reason);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
