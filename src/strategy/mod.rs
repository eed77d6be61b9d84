//! Staking strategy: martingale progression policies.

pub mod martingale;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::TraderError;

pub use martingale::{ManualLeg, ManualSequence, MartingaleStrategy, StrategyState, Transition};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Martingale progression policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Policy {
    /// 3 cycles × 3 steps; the stake carries across cycle boundaries.
    #[serde(rename = "cumulative_3cycle")]
    Cumulative3Cycle,
    /// 2 cycles × 2 steps; every cycle restarts at the base amount.
    #[serde(rename = "reset_2cycle")]
    Reset2Cycle,
    /// Reset2Cycle math with externally chosen asset/direction per cycle.
    #[serde(rename = "manual_2cycle")]
    Manual2Cycle,
}

impl Policy {
    pub const ALL: &'static [Policy] = &[
        Policy::Cumulative3Cycle,
        Policy::Reset2Cycle,
        Policy::Manual2Cycle,
    ];

    pub fn max_cycles(&self) -> u32 {
        match self {
            Policy::Cumulative3Cycle => 3,
            Policy::Reset2Cycle | Policy::Manual2Cycle => 2,
        }
    }

    pub fn max_steps(&self) -> u32 {
        match self {
            Policy::Cumulative3Cycle => 3,
            Policy::Reset2Cycle | Policy::Manual2Cycle => 2,
        }
    }

    /// Whether each new cycle restarts at the base amount.
    pub fn resets_between_cycles(&self) -> bool {
        !matches!(self, Policy::Cumulative3Cycle)
    }

    /// Exponent applied to the multiplier at the given position.
    pub fn progression_exponent(&self, cycle_index: u32, step_index: u32) -> u32 {
        if self.resets_between_cycles() {
            step_index - 1
        } else {
            (cycle_index - 1) * self.max_steps() + (step_index - 1)
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Cumulative3Cycle => write!(f, "3-Cycle Cumulative"),
            Policy::Reset2Cycle => write!(f, "2-Cycle Reset"),
            Policy::Manual2Cycle => write!(f, "2-Cycle Manual"),
        }
    }
}

impl std::str::FromStr for Policy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cumulative_3cycle" | "cumulative" | "1" => Ok(Policy::Cumulative3Cycle),
            "reset_2cycle" | "reset" | "2" => Ok(Policy::Reset2Cycle),
            "manual_2cycle" | "manual" | "3" => Ok(Policy::Manual2Cycle),
            _ => Err(anyhow::anyhow!("Unknown martingale policy: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Static staking configuration for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub policy: Policy,
    pub base_amount: Decimal,
    pub multiplier: Decimal,
    /// Largest stake ever submitted. `None` disables the check.
    #[serde(default)]
    pub max_stake: Option<Decimal>,
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), TraderError> {
        if self.base_amount <= Decimal::ZERO {
            return Err(TraderError::Config(format!(
                "base_amount must be positive, got {}",
                self.base_amount
            )));
        }
        if self.multiplier <= Decimal::ONE {
            return Err(TraderError::Config(format!(
                "multiplier must be greater than 1, got {}",
                self.multiplier
            )));
        }
        if let Some(max) = self.max_stake {
            if max < self.base_amount {
                return Err(TraderError::Config(format!(
                    "max_stake {max} is below base_amount {}",
                    self.base_amount
                )));
            }
        }
        Ok(())
    }
}
