//! Execution scheduler.
//!
//! Fires each trade ahead of its target time by the tracker's latency
//! estimate, submits it through the platform with a small retry policy, and
//! feeds the measured round trip back into the tracker.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::stop::StopListener;
use crate::engine::timing::{TimingSample, TimingTracker};
use crate::platforms::{TradeReceipt, TradingPlatform};
use crate::types::{Direction, TradeAttempt, TradeOutcome, TradeResult, TraderError};

/// Upper bound on how far ahead of its target a trade is fired.
const MAX_LEAD_SECS: f64 = 60.0;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// How transient platform failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls allowed, including the first.
    pub max_attempts: u32,
    /// Fixed pause between calls.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// TOML form of `RetryPolicy`.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_ms: 500,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(cfg: RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff: Duration::from_millis(cfg.backoff_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Everything needed to place one trade at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRequest {
    pub asset: String,
    pub direction: Direction,
    pub stake: Decimal,
    pub duration_secs: u32,
    pub target_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct ExecutionScheduler {
    platform: Arc<dyn TradingPlatform>,
    tracker: Arc<TimingTracker>,
    retry: RetryPolicy,
}

impl ExecutionScheduler {
    pub fn new(
        platform: Arc<dyn TradingPlatform>,
        tracker: Arc<TimingTracker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            platform,
            tracker,
            retry,
        }
    }

    pub fn platform(&self) -> &Arc<dyn TradingPlatform> {
        &self.platform
    }

    pub fn tracker(&self) -> &Arc<TimingTracker> {
        &self.tracker
    }

    /// Instant to call the platform so the order lands on `target_time`.
    pub fn fire_time(&self, target_time: DateTime<Utc>, duration_secs: u32) -> DateTime<Utc> {
        let latency = self.tracker.average_latency(duration_secs).clamp(0.0, MAX_LEAD_SECS);
        target_time - chrono::Duration::milliseconds((latency * 1000.0).round() as i64)
    }

    /// Wait for the fire time, submit, and report the outcome.
    ///
    /// Execution failures are returned as `TradeOutcome::Error` results.
    /// The only `Err` is `Cancelled`, when `stop` fires during the wait or
    /// during a retry backoff.
    pub async fn schedule_and_execute(
        &self,
        request: TradeRequest,
        stop: &mut StopListener,
    ) -> Result<TradeResult, TraderError> {
        let fire_time = self.fire_time(request.target_time, request.duration_secs);
        let now = Utc::now();
        let late = fire_time <= now;

        if late {
            warn!(
                asset = %request.asset,
                behind_ms = (now - fire_time).num_milliseconds(),
                "Fire time already passed, submitting immediately"
            );
        } else {
            let wait = (fire_time - now).to_std().unwrap_or_default();
            debug!(
                asset = %request.asset,
                wait_ms = wait.as_millis() as u64,
                fire_time = %fire_time.format("%H:%M:%S%.3f"),
                "Waiting for fire time"
            );
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = stop.stopped() => {
                    info!(asset = %request.asset, "Scheduled trade cancelled");
                    return Err(TraderError::Cancelled);
                }
            }
        }

        if stop.is_stopped() {
            return Err(TraderError::Cancelled);
        }

        let submit_time = Utc::now();
        let (execution, retries) = self.submit_with_retry(&request, stop).await?;

        let attempt = TradeAttempt {
            id: Uuid::new_v4(),
            asset: request.asset,
            direction: request.direction,
            stake_amount: request.stake,
            duration_seconds: request.duration_secs,
            submit_time,
            target_time: request.target_time,
            late,
            retries,
        };

        let result = match execution {
            Ok((receipt, measured)) if receipt.outcome.is_settled() => {
                self.tracker.record(TimingSample {
                    measured_duration_seconds: measured,
                    requested_duration_seconds: attempt.duration_seconds,
                });
                TradeResult {
                    attempt,
                    trade_id: Some(receipt.trade_id),
                    outcome: receipt.outcome,
                    payout_amount: receipt.payout_amount,
                    result_time: Utc::now(),
                    error: None,
                }
            }
            Ok((receipt, _)) => TradeResult {
                attempt,
                trade_id: Some(receipt.trade_id),
                outcome: TradeOutcome::Error,
                payout_amount: Decimal::ZERO,
                result_time: Utc::now(),
                error: Some("platform reported an unsettled trade".to_string()),
            },
            Err(reason) => {
                warn!(asset = %attempt.asset, retries, error = %reason, "Trade execution failed");
                TradeResult {
                    attempt,
                    trade_id: None,
                    outcome: TradeOutcome::Error,
                    payout_amount: Decimal::ZERO,
                    result_time: Utc::now(),
                    error: Some(reason),
                }
            }
        };

        info!(
            asset = %result.attempt.asset,
            direction = %result.attempt.direction,
            stake = format!("${:.2}", result.attempt.stake_amount),
            outcome = %result.outcome,
            drift_ms = (result.attempt.submit_time - result.attempt.target_time).num_milliseconds(),
            late = result.attempt.late,
            "Trade executed"
        );

        Ok(result)
    }

    /// Call the platform, retrying transient errors per the retry policy.
    /// Returns the receipt with the measured seconds of the successful call,
    /// plus the number of retries made.
    async fn submit_with_retry(
        &self,
        request: &TradeRequest,
        stop: &mut StopListener,
    ) -> Result<(Result<(TradeReceipt, f64), String>, u32), TraderError> {
        let class = self.tracker.class_for(request.duration_secs);
        let deadline = Duration::from_secs(request.duration_secs as u64 + class.result_buffer_secs);
        let mut retries = 0;

        loop {
            let started = Instant::now();
            let call = self.platform.place_trade(
                &request.asset,
                request.direction,
                request.stake,
                request.duration_secs,
            );

            match tokio::time::timeout(deadline, call).await {
                Ok(Ok(receipt)) => {
                    return Ok((Ok((receipt, started.elapsed().as_secs_f64())), retries));
                }
                Ok(Err(e)) if e.is_transient() && retries + 1 < self.retry.max_attempts => {
                    warn!(
                        platform = self.platform.name(),
                        attempt = retries + 1,
                        backoff_ms = self.retry.backoff.as_millis() as u64,
                        error = %e,
                        "Transient error, retrying"
                    );
                    retries += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry.backoff) => {}
                        _ = stop.stopped() => {
                            info!(asset = %request.asset, retries, "Retry cancelled");
                            return Err(TraderError::Cancelled);
                        }
                    }
                }
                Ok(Err(e)) if e.is_transient() => {
                    let err = TraderError::TransientExecution(e.to_string());
                    return Ok((Err(err.to_string()), retries));
                }
                Ok(Err(e)) => return Ok((Err(e.to_string()), retries)),
                Err(_) => {
                    return Ok((
                        Err(format!("no result within {}s", deadline.as_secs())),
                        retries,
                    ));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
