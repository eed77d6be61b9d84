//! Paper-trading platform.
//!
//! Settles trades in-process against a simulated balance. Used for dry
//! runs and as the default platform of the binary until a broker client is
//! plugged in.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{PlatformError, TradeReceipt, TradingPlatform};
use crate::types::{Direction, TradeOutcome};

/// Assets offered by the paper platform when none are configured.
const DEFAULT_ASSETS: &[&str] = &[
    "EURUSD_otc", "GBPUSD_otc", "USDJPY_otc", "USDCHF_otc", "USDCAD_otc", "EURGBP_otc",
    "AUDUSD_otc", "NZDUSD_otc", "AUDCAD_otc", "AUDCHF_otc", "AUDJPY_otc", "CADCHF_otc",
    "CADJPY_otc", "CHFJPY_otc", "EURCHF_otc", "EURJPY_otc", "EURNZD_otc", "GBPAUD_otc",
    "GBPJPY_otc", "NZDJPY_otc", "NZDCAD_otc",
];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PaperConfig {
    pub initial_balance: Decimal,
    /// Profit per unit staked on a win (0.8 = 80% payout).
    pub payout_ratio: Decimal,
    /// Probability of a win, 0.0 to 1.0.
    pub win_rate: f64,
    /// Sleep for the option's duration before settling.
    #[serde(default)]
    pub settle_in_real_time: bool,
    #[serde(default)]
    pub assets: Vec<String>,
    /// Fixed seed for reproducible outcome sequences.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_balance: Decimal::from(1000),
            payout_ratio: Decimal::new(8, 1),
            win_rate: 0.6,
            settle_in_real_time: false,
            assets: Vec::new(),
            seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

pub struct PaperPlatform {
    config: PaperConfig,
    assets: HashSet<String>,
    balance: Mutex<Decimal>,
    rng: Mutex<StdRng>,
}

impl PaperPlatform {
    pub fn new(config: PaperConfig) -> Self {
        let assets = if config.assets.is_empty() {
            DEFAULT_ASSETS.iter().map(|a| a.to_string()).collect()
        } else {
            config.assets.iter().cloned().collect()
        };
        let balance = Mutex::new(config.initial_balance);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            assets,
            balance,
            rng: Mutex::new(rng),
        }
    }

    fn roll(&self) -> TradeOutcome {
        let p = if self.config.win_rate.is_nan() {
            0.0
        } else {
            self.config.win_rate.clamp(0.0, 1.0)
        };
        let won = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_bool(p);
        if won {
            TradeOutcome::Win
        } else {
            TradeOutcome::Loss
        }
    }
}

#[async_trait]
impl TradingPlatform for PaperPlatform {
    async fn place_trade(
        &self,
        asset: &str,
        direction: Direction,
        amount: Decimal,
        duration_secs: u32,
    ) -> Result<TradeReceipt, PlatformError> {
        if !self.assets.contains(asset) {
            return Err(PlatformError::Rejected(format!("asset {asset} is closed")));
        }
        if amount <= Decimal::ZERO {
            return Err(PlatformError::Rejected(format!("invalid amount {amount}")));
        }

        {
            let mut balance = self.balance.lock().unwrap_or_else(PoisonError::into_inner);
            if amount > *balance {
                return Err(PlatformError::Rejected(format!(
                    "insufficient balance: need ${amount:.2}, have ${:.2}",
                    *balance
                )));
            }
            *balance -= amount;
        }

        let id = Uuid::new_v4();
        debug!(%id, asset, %direction, amount = %amount, duration_secs, "[PAPER] Trade opened");

        if self.config.settle_in_real_time {
            tokio::time::sleep(Duration::from_secs(duration_secs as u64)).await;
        }

        let outcome = self.roll();
        let payout_amount = match outcome {
            TradeOutcome::Win => amount * (Decimal::ONE + self.config.payout_ratio),
            _ => Decimal::ZERO,
        };

        let mut balance = self.balance.lock().unwrap_or_else(PoisonError::into_inner);
        *balance += payout_amount;
        info!(
            %id,
            asset,
            %outcome,
            payout = format!("${:.2}", payout_amount),
            balance = format!("${:.2}", *balance),
            "[PAPER] Trade settled"
        );

        Ok(TradeReceipt {
            trade_id: format!("paper-{id}"),
            outcome,
            payout_amount,
        })
    }

    async fn get_balance(&self) -> Result<Decimal, PlatformError> {
        Ok(*self.balance.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn available_assets(&self) -> Result<HashSet<String>, PlatformError> {
        Ok(self.assets.clone())
    }

    fn name(&self) -> &str {
        "paper"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
