//! Shared types for the AUTOTRADER engine.
//!
//! Signals, trade attempts and results, session totals and the domain
//! error type. Strategy, engine and platform modules all depend on these
//! without depending on each other.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Option direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Call,
    Put,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Call => write!(f, "CALL"),
            Direction::Put => write!(f, "PUT"),
        }
    }
}

/// Parse a direction (case-insensitive). Accepts the buy/sell and up/down
/// spellings found in signal channels.
impl std::str::FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "call" | "buy" | "up" | "higher" => Ok(Direction::Call),
            "put" | "sell" | "down" | "lower" => Ok(Direction::Put),
            _ => Err(anyhow::anyhow!("Unknown direction: {s}")),
        }
    }
}

/// Settled outcome of a single trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeOutcome {
    Win,
    Loss,
    Draw,
    /// Execution failed; the trade never settled.
    Error,
}

impl TradeOutcome {
    /// Whether this outcome counts towards win/loss/draw tallies.
    pub fn is_settled(&self) -> bool {
        !matches!(self, TradeOutcome::Error)
    }
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeOutcome::Win => write!(f, "WIN"),
            TradeOutcome::Loss => write!(f, "LOSS"),
            TradeOutcome::Draw => write!(f, "DRAW"),
            TradeOutcome::Error => write!(f, "ERROR"),
        }
    }
}

/// Why a session stopped accepting signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    StopLoss,
    TakeProfit,
    SignalsExhausted,
    Stopped,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::StopLoss => write!(f, "stop loss reached"),
            HaltReason::TakeProfit => write!(f, "take profit reached"),
            HaltReason::SignalsExhausted => write!(f, "signal source exhausted"),
            HaltReason::Stopped => write!(f, "stop requested"),
        }
    }
}

/// Session lifecycle: `Idle → Active → Halted`. `Halted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    Active,
    Halted(HaltReason),
}

impl SessionStatus {
    pub fn is_halted(&self) -> bool {
        matches!(self, SessionStatus::Halted(_))
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "IDLE"),
            SessionStatus::Active => write!(f, "ACTIVE"),
            SessionStatus::Halted(reason) => write!(f, "HALTED ({reason})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// A timed instruction to trade an asset in a direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub asset: String,
    pub direction: Direction,
    /// Instant the order should reach the platform.
    pub target_time: DateTime<Utc>,
    /// Option expiry in seconds.
    pub requested_duration: u32,
    /// Original message text, kept for audit.
    pub source_text: String,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {} ({}s)",
            self.asset,
            self.direction,
            self.target_time.format("%H:%M:%S"),
            self.requested_duration,
        )
    }
}

impl Signal {
    pub fn new(
        asset: impl Into<String>,
        direction: Direction,
        target_time: DateTime<Utc>,
        requested_duration: u32,
    ) -> Self {
        Self {
            asset: asset.into(),
            direction,
            target_time,
            requested_duration,
            source_text: String::new(),
        }
    }

    /// Seconds between the target time and `now` (negative when the
    /// target is still ahead).
    pub fn lateness_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.target_time).num_milliseconds() as f64 / 1000.0
    }
}

// ---------------------------------------------------------------------------
// Trade attempt & result
// ---------------------------------------------------------------------------

/// A concrete order, fixed immediately before submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAttempt {
    pub id: Uuid,
    pub asset: String,
    pub direction: Direction,
    pub stake_amount: Decimal,
    pub duration_seconds: u32,
    pub submit_time: DateTime<Utc>,
    pub target_time: DateTime<Utc>,
    /// Fired immediately because the computed fire time had already passed.
    pub late: bool,
    /// Number of retries after transient failures.
    pub retries: u32,
}

impl fmt::Display for TradeAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let drift_ms = (self.submit_time - self.target_time).num_milliseconds();
        write!(
            f,
            "{} {} ${:.2} {}s submitted {} (drift {drift_ms:+}ms{})",
            self.asset,
            self.direction,
            self.stake_amount,
            self.duration_seconds,
            self.submit_time.format("%H:%M:%S%.3f"),
            if self.late { ", late" } else { "" },
        )
    }
}

/// The settled (or failed) result of a trade attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub attempt: TradeAttempt,
    /// Platform order id, absent when execution failed before placement.
    pub trade_id: Option<String>,
    pub outcome: TradeOutcome,
    /// Gross amount returned by the platform (stake + profit on a win).
    pub payout_amount: Decimal,
    pub result_time: DateTime<Utc>,
    /// Failure description for `TradeOutcome::Error`.
    pub error: Option<String>,
}

impl fmt::Display for TradeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {} (pnl {:+.2})", self.attempt, self.outcome, self.net_pnl())
    }
}

impl TradeResult {
    /// Profit or loss this result contributes to the session.
    pub fn net_pnl(&self) -> Decimal {
        match self.outcome {
            TradeOutcome::Win => self.payout_amount - self.attempt.stake_amount,
            TradeOutcome::Loss => -self.attempt.stake_amount,
            TradeOutcome::Draw | TradeOutcome::Error => Decimal::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Session totals
// ---------------------------------------------------------------------------

/// Running totals for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub trades_placed: u64,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    /// Attempts that ended in `TradeOutcome::Error`. Not part of `trades_placed`.
    pub errors: u64,
    /// Sequences force-reset because the next stake would exceed the maximum.
    pub stake_limit_resets: u64,
    pub net_profit: Decimal,
    pub stop_loss_limit: Option<Decimal>,
    pub take_profit_limit: Option<Decimal>,
}

impl fmt::Display for SessionTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trades={} (W{}/L{}/D{}) errors={} win_rate={:.1}% net=${:.2}",
            self.trades_placed,
            self.wins,
            self.losses,
            self.draws,
            self.errors,
            self.win_rate(),
            self.net_profit,
        )
    }
}

impl SessionTotals {
    pub fn new(stop_loss_limit: Option<Decimal>, take_profit_limit: Option<Decimal>) -> Self {
        Self {
            trades_placed: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            errors: 0,
            stake_limit_resets: 0,
            net_profit: Decimal::ZERO,
            stop_loss_limit,
            take_profit_limit,
        }
    }

    /// Win rate over decided trades, as a percentage. Draws and errors are
    /// excluded. Returns 0.0 with no decided trades.
    pub fn win_rate(&self) -> f64 {
        let decided = self.wins + self.losses;
        if decided == 0 {
            0.0
        } else {
            (self.wins as f64 / decided as f64) * 100.0
        }
    }

    /// The threshold crossed by the current net profit, if any.
    pub fn threshold_crossed(&self) -> Option<HaltReason> {
        if let Some(limit) = self.stop_loss_limit {
            if self.net_profit <= -limit {
                return Some(HaltReason::StopLoss);
            }
        }
        if let Some(limit) = self.take_profit_limit {
            if self.net_profit >= limit {
                return Some(HaltReason::TakeProfit);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for AUTOTRADER.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TraderError {
    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    #[error("Stake limit exceeded: next stake ${stake:.2} above max ${limit:.2}")]
    StakeLimitExceeded { stake: Decimal, limit: Decimal },

    #[error("Transient execution error: {0}")]
    TransientExecution(String),

    #[error("Session halted: {0}")]
    SessionHalted(HaltReason),

    #[error("Signal expired: {asset} is {late_secs:.1}s past its target time")]
    SignalExpired { asset: String, late_secs: f64 },

    #[error("Cancelled by stop request")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
