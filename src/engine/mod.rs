//! Core engine: timing, scheduling, and session control.

pub mod runner;
pub mod scheduler;
pub mod session;
pub mod stop;
pub mod timing;

pub use runner::run_session;
pub use scheduler::{ExecutionScheduler, RetryConfig, RetryPolicy, TradeRequest};
pub use session::{SessionConfig, SessionController};
pub use stop::{StopListener, StopSignal};
pub use timing::{DurationClass, TimingConfig, TimingSample, TimingTracker};
