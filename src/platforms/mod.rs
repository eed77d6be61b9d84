//! Trading platform integrations.
//!
//! Defines the `TradingPlatform` trait the engine submits orders through,
//! and a paper-trading implementation for dry runs. Real broker clients
//! live outside this crate and implement the same trait.

pub mod paper;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{Direction, TradeOutcome};

/// What the platform reports once a trade has settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub trade_id: String,
    pub outcome: TradeOutcome,
    /// Gross return: stake + profit on a win, stake on a draw, zero on a loss.
    pub payout_amount: Decimal,
}

/// Platform failures, split by whether a retry can help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// Connection drop, timeout, rate limit. Safe to retry.
    #[error("Transient platform error: {0}")]
    Transient(String),

    /// The platform refused the order (closed asset, bad amount, auth).
    #[error("Order rejected: {0}")]
    Rejected(String),
}

impl PlatformError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Transient(_))
    }
}

/// Abstraction over binary-option platforms.
///
/// `place_trade` submits the order and resolves once the outcome is known,
/// so its latency covers the whole round trip including the option's own
/// duration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradingPlatform: Send + Sync {
    /// Place a trade and wait for its settlement.
    async fn place_trade(
        &self,
        asset: &str,
        direction: Direction,
        amount: Decimal,
        duration_secs: u32,
    ) -> Result<TradeReceipt, PlatformError>;

    /// Current account balance.
    async fn get_balance(&self) -> Result<Decimal, PlatformError>;

    /// Assets currently open for trading.
    async fn available_assets(&self) -> Result<HashSet<String>, PlatformError>;

    /// Platform name for logging.
    fn name(&self) -> &str;
}
