//! Martingale staking state machine.
//!
//! Computes the next stake from the sequence of past outcomes. Amounts are
//! carried as exact decimals; rounding to cents happens only when a stake is
//! handed out for submission, so escalation never compounds rounding error.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Policy, StrategyConfig};
use crate::types::{Direction, TradeOutcome, TraderError};

/// Round an amount to the cent, halves away from zero (15.625 → 15.63).
pub fn round_stake(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Position within the martingale progression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyState {
    pub policy: Policy,
    /// 1-based cycle number.
    pub cycle_index: u32,
    /// 1-based step number within the cycle.
    pub step_index: u32,
    pub base_amount: Decimal,
    pub multiplier: Decimal,
    /// Unrounded stake for the next trade.
    pub current_amount: Decimal,
    /// Stakes lost so far in the current sequence (cumulative policy) or
    /// current cycle (resetting policies).
    pub cumulative_carry: Decimal,
}

impl StrategyState {
    fn initial(config: &StrategyConfig) -> Self {
        Self {
            policy: config.policy,
            cycle_index: 1,
            step_index: 1,
            base_amount: config.base_amount,
            multiplier: config.multiplier,
            current_amount: config.base_amount,
            cumulative_carry: Decimal::ZERO,
        }
    }

    /// Overall trade number within the sequence (1-based).
    pub fn position(&self) -> u32 {
        (self.cycle_index - 1) * self.policy.max_steps() + self.step_index
    }
}

/// What the most recent `record_outcome` did to the progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// Nothing recorded yet.
    Start,
    /// Loss inside a cycle; next step at a higher stake.
    Escalated,
    /// Loss on the last step of a cycle; next cycle begins.
    CycleAdvanced,
    /// Win; the whole sequence restarts at the base amount.
    SequenceWon,
    /// Every step of every cycle lost; back to the base amount.
    SequenceLost,
    /// Next stake would have exceeded the maximum; forced back to base.
    StakeLimitReset,
    /// Draw; position unchanged.
    Held,
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MartingaleStrategy {
    state: StrategyState,
    max_stake: Option<Decimal>,
    last_transition: Transition,
}

impl MartingaleStrategy {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            state: StrategyState::initial(config),
            max_stake: config.max_stake,
            last_transition: Transition::Start,
        }
    }

    pub fn state(&self) -> &StrategyState {
        &self.state
    }

    pub fn policy(&self) -> Policy {
        self.state.policy
    }

    pub fn last_transition(&self) -> Transition {
        self.last_transition
    }

    /// Stake for the next trade, rounded to the cent.
    pub fn next_stake(&self) -> Decimal {
        round_stake(self.state.current_amount)
    }

    /// Whether the most recent outcome closed a cycle.
    pub fn is_cycle_complete(&self) -> bool {
        matches!(
            self.last_transition,
            Transition::CycleAdvanced
                | Transition::SequenceWon
                | Transition::SequenceLost
                | Transition::StakeLimitReset
        )
    }

    /// Whether the most recent outcome closed the whole sequence.
    pub fn is_sequence_complete(&self) -> bool {
        matches!(
            self.last_transition,
            Transition::SequenceWon | Transition::SequenceLost | Transition::StakeLimitReset
        )
    }

    /// Restart from cycle 1, step 1 at the base amount.
    pub fn reset(&mut self) {
        self.state.cycle_index = 1;
        self.state.step_index = 1;
        self.state.current_amount = self.state.base_amount;
        self.state.cumulative_carry = Decimal::ZERO;
    }

    /// Advance the progression with a settled outcome.
    ///
    /// `Error` leaves everything untouched. On a loss that would push the
    /// next stake above `max_stake`, the sequence is reset and
    /// `StakeLimitExceeded` is returned; the strategy stays usable.
    pub fn record_outcome(&mut self, outcome: TradeOutcome) -> Result<StrategyState, TraderError> {
        match outcome {
            TradeOutcome::Error => {
                debug!("Error outcome: strategy state unchanged");
            }
            TradeOutcome::Draw => {
                self.last_transition = Transition::Held;
                debug!(
                    cycle = self.state.cycle_index,
                    step = self.state.step_index,
                    "Draw: holding position"
                );
            }
            TradeOutcome::Win => {
                info!(
                    policy = %self.state.policy,
                    cycle = self.state.cycle_index,
                    step = self.state.step_index,
                    "Win: sequence reset to C1S1"
                );
                self.reset();
                self.last_transition = Transition::SequenceWon;
            }
            TradeOutcome::Loss => self.advance_after_loss()?,
        }
        Ok(self.state.clone())
    }

    fn advance_after_loss(&mut self) -> Result<(), TraderError> {
        let policy = self.state.policy;
        let lost = self.state.current_amount;

        if self.state.step_index < policy.max_steps() {
            let Some(next) = self.escalated_amount() else {
                return self.overflow_reset();
            };
            self.state.step_index += 1;
            self.state.current_amount = next;
            self.state.cumulative_carry += lost;
            self.last_transition = Transition::Escalated;
        } else if self.state.cycle_index < policy.max_cycles() {
            if policy.resets_between_cycles() {
                self.state.current_amount = self.state.base_amount;
                self.state.cumulative_carry = Decimal::ZERO;
            } else {
                let Some(next) = self.escalated_amount() else {
                    return self.overflow_reset();
                };
                self.state.current_amount = next;
                self.state.cumulative_carry += lost;
            }
            self.state.cycle_index += 1;
            self.state.step_index = 1;
            self.last_transition = Transition::CycleAdvanced;
        } else {
            warn!(
                policy = %policy,
                carry = %(self.state.cumulative_carry + lost),
                "All cycles lost: sequence reset to base"
            );
            self.reset();
            self.last_transition = Transition::SequenceLost;
            return Ok(());
        }

        debug!(
            cycle = self.state.cycle_index,
            step = self.state.step_index,
            next_stake = %self.next_stake(),
            "Loss: progression advanced"
        );

        if let Some(limit) = self.max_stake {
            let stake = self.next_stake();
            if stake > limit {
                warn!(stake = %stake, limit = %limit, "Next stake above maximum: sequence reset");
                self.reset();
                self.last_transition = Transition::StakeLimitReset;
                return Err(TraderError::StakeLimitExceeded { stake, limit });
            }
        }
        Ok(())
    }

    fn escalated_amount(&self) -> Option<Decimal> {
        self.state.current_amount.checked_mul(self.state.multiplier)
    }

    /// The next stake is past what a `Decimal` can hold. Any cap is exceeded
    /// by definition; without one the progression cannot continue either.
    fn overflow_reset(&mut self) -> Result<(), TraderError> {
        warn!(
            cycle = self.state.cycle_index,
            step = self.state.step_index,
            "Next stake overflows: sequence reset"
        );
        self.reset();
        self.last_transition = Transition::StakeLimitReset;
        Err(match self.max_stake {
            Some(limit) => TraderError::StakeLimitExceeded { stake: Decimal::MAX, limit },
            None => TraderError::Config(format!(
                "stake progression overflows at multiplier {}",
                self.state.multiplier
            )),
        })
    }
}

// ---------------------------------------------------------------------------
// Manual sequences
// ---------------------------------------------------------------------------

/// Asset and direction chosen by the operator for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualLeg {
    pub asset: String,
    pub direction: Direction,
}

/// Operator-directed legs for a `Manual2Cycle` sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualSequence {
    pub cycle_one: ManualLeg,
    pub cycle_two: ManualLeg,
}

impl ManualSequence {
    pub fn leg_for(&self, cycle_index: u32) -> &ManualLeg {
        if cycle_index <= 1 {
            &self.cycle_one
        } else {
            &self.cycle_two
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
