//! Configuration loading from TOML.
//!
//! Reads `config.toml` into strongly-typed structs. Everything except the
//! trader header and the staking parameters has a default, so a minimal
//! config only names the strategy and one channel.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;

use crate::engine::scheduler::RetryConfig;
use crate::engine::session::SessionConfig;
use crate::engine::timing::TimingConfig;
use crate::platforms::paper::PaperConfig;
use crate::strategy::StrategyConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub trader: TraderConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TraderConfig {
    pub name: String,
    /// Option duration used when a signal row does not carry one.
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: u32,
}

fn default_duration_secs() -> u32 {
    60
}

/// One signal channel, traded as an independent session.
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    pub name: String,
    /// CSV feed recorded by the channel monitor.
    pub signals_csv: String,
    /// Where the finished session journal is written. Skipped when unset.
    #[serde(default)]
    pub journal_path: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()?;
        self.session.validate()?;
        self.timing.validate()?;

        if self.trader.default_duration_secs == 0 {
            bail!("trader.default_duration_secs must be positive");
        }

        let mut names = HashSet::new();
        for channel in &self.channels {
            if !names.insert(channel.name.as_str()) {
                bail!("Duplicate channel name: {}", channel.name);
            }
        }
        Ok(())
    }
}
