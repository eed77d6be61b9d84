//! Persistence layer.
//!
//! Writes a finished session's journal (totals, final strategy position,
//! and full trade history) to a JSON file, and reads it back for review.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::session::SessionController;
use crate::strategy::StrategyState;
use crate::types::{SessionStatus, SessionTotals, TradeResult};

/// Default journal file path.
const DEFAULT_JOURNAL_FILE: &str = "autotrader_journal.json";

/// Snapshot of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionJournal {
    pub session: String,
    pub status: SessionStatus,
    pub totals: SessionTotals,
    pub strategy: StrategyState,
    pub history: Vec<TradeResult>,
    pub saved_at: DateTime<Utc>,
}

impl SessionJournal {
    pub fn from_controller(controller: &SessionController) -> Self {
        Self {
            session: controller.name().to_string(),
            status: controller.status(),
            totals: controller.current_status(),
            strategy: controller.strategy().state().clone(),
            history: controller.history().to_vec(),
            saved_at: Utc::now(),
        }
    }
}

/// Save a session journal to a JSON file.
pub fn save_journal(journal: &SessionJournal, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_JOURNAL_FILE);
    let json = serde_json::to_string_pretty(journal)
        .context("Failed to serialise session journal")?;

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create journal directory {}", parent.display()))?;
        }
    }

    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write journal to {path}"))?;

    debug!(path, session = %journal.session, trades = journal.history.len(), "Journal saved");
    Ok(())
}

/// Load a session journal. Returns None if the file doesn't exist.
pub fn load_journal(path: Option<&str>) -> Result<Option<SessionJournal>> {
    let path = path.unwrap_or(DEFAULT_JOURNAL_FILE);

    if !Path::new(path).exists() {
        info!(path, "No journal found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read journal from {path}"))?;

    let journal: SessionJournal = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse journal from {path}"))?;

    info!(
        path,
        session = %journal.session,
        status = %journal.status,
        net = %journal.totals.net_profit,
        "Journal loaded"
    );

    Ok(Some(journal))
}

/// Delete a journal file if present.
pub fn delete_journal(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_JOURNAL_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to delete journal file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
