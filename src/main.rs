//! AUTOTRADER: signal-driven binary-option trader.
//!
//! Entry point. Loads configuration, initialises structured logging, and
//! runs one martingale session per configured signal channel until every
//! feed is exhausted, a threshold halts it, or Ctrl+C is pressed.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use autotrader::config::{self, ChannelConfig};
use autotrader::engine::{
    run_session, ExecutionScheduler, RetryPolicy, SessionController, StopListener, StopSignal,
    TimingTracker,
};
use autotrader::platforms::paper::PaperPlatform;
use autotrader::platforms::TradingPlatform;
use autotrader::signals::CsvSignalSource;
use autotrader::storage::{self, SessionJournal};
use autotrader::types::SessionTotals;

const BANNER: &str = r#"
    _   _   _ _____ ___ _____ ____      _    ____  _____ ____
   / \ | | | |_   _/ _ \_   _|  _ \    / \  |  _ \| ____|  _ \
  / _ \| | | | | || | | || | | |_) |  / _ \ | | | |  _| | |_) |
 / ___ \ |_| | | || |_| || | |  _ <  / ___ \| |_| | |___|  _ <
/_/   \_\___/  |_| \___/ |_| |_| \_\/_/   \_\____/|_____|_| \_\

  Martingale signal trader
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        trader = %cfg.trader.name,
        policy = %cfg.strategy.policy,
        base = format!("${:.2}", cfg.strategy.base_amount),
        multiplier = %cfg.strategy.multiplier,
        channels = cfg.channels.len(),
        "AUTOTRADER starting up"
    );

    if cfg.channels.is_empty() {
        warn!("No channels configured, nothing to trade");
        return Ok(());
    }

    // -- Shared components -----------------------------------------------

    let tracker = Arc::new(TimingTracker::new(cfg.timing.clone()));
    let platform: Arc<dyn TradingPlatform> = Arc::new(PaperPlatform::new(cfg.paper.clone()));
    match platform.get_balance().await {
        Ok(balance) => info!(platform = platform.name(), balance = format!("${:.2}", balance), "Platform ready"),
        Err(e) => warn!(platform = platform.name(), error = %e, "Could not read balance"),
    }

    let (stop, _) = StopSignal::new();
    let retry = RetryPolicy::from(cfg.retry.clone());

    // -- One task per channel --------------------------------------------

    let handles: Vec<_> = cfg
        .channels
        .iter()
        .cloned()
        .map(|channel| {
            let cfg = cfg.clone();
            let scheduler = ExecutionScheduler::new(Arc::clone(&platform), Arc::clone(&tracker), retry);
            let listener = stop.listener();
            tokio::spawn(async move {
                let name = channel.name.clone();
                (name, run_channel(&cfg, channel, scheduler, listener).await)
            })
        })
        .collect();

    let sessions = futures::future::join_all(handles);
    tokio::pin!(sessions);

    let finished = tokio::select! {
        results = &mut sessions => Some(results),
        _ = tokio::signal::ctrl_c() => None,
    };
    let results = match finished {
        Some(results) => results,
        None => {
            info!("Shutdown signal received, stopping sessions");
            stop.stop();
            sessions.await
        }
    };

    // -- Summary ---------------------------------------------------------

    let mut net = rust_decimal::Decimal::ZERO;
    for joined in results {
        match joined {
            Ok((name, Ok(totals))) => {
                net += totals.net_profit;
                info!(session = %name, summary = %totals, "Session summary");
            }
            Ok((name, Err(e))) => error!(session = %name, error = format!("{e:#}"), "Session failed"),
            Err(e) => error!(error = %e, "Session task panicked"),
        }
    }

    let balance = platform.get_balance().await.ok();
    info!(
        net = format!("${:.2}", net),
        balance = ?balance,
        latency_short = format!("{:.3}s", tracker.average_latency(60)),
        "AUTOTRADER shut down cleanly."
    );

    Ok(())
}

/// Run one channel's session to completion and write its journal.
async fn run_channel(
    cfg: &config::AppConfig,
    channel: ChannelConfig,
    scheduler: ExecutionScheduler,
    stop: StopListener,
) -> Result<SessionTotals> {
    let mut source = CsvSignalSource::open(&channel.signals_csv, cfg.trader.default_duration_secs)?;

    let mut controller = SessionController::new(
        channel.name.as_str(),
        &cfg.strategy,
        cfg.session.clone(),
        scheduler,
        stop.clone(),
    )
    .with_context(|| format!("Invalid session settings for channel {}", channel.name))?;

    match controller.refresh_assets().await {
        Ok(count) => info!(session = %channel.name, assets = count, "Assets loaded"),
        Err(e) => warn!(session = %channel.name, error = %e, "Asset list unavailable"),
    }

    let totals = run_session(&mut controller, &mut source, stop).await;

    if let Some(path) = channel.journal_path.as_deref() {
        storage::save_journal(&SessionJournal::from_controller(&controller), Some(path))?;
        info!(session = %channel.name, path, "Journal written");
    }

    Ok(totals)
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("autotrader=info"));

    let json_logging = std::env::var("AUTOTRADER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
