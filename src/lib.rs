//! AUTOTRADER: signal-driven binary-option trader with martingale staking.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod platforms;
pub mod signals;
pub mod strategy;
pub mod engine;
pub mod storage;
