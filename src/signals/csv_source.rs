//! CSV signal feed, as written by the channel monitor.
//!
//! Expected columns: `asset, direction, signal_time, message_text,
//! is_signal, duration`. Extra columns (timestamp, channel, message id) are
//! ignored. Times are wall-clock `HH:MM` or `HH:MM:SS` on a local date that
//! starts as today and moves forward when the feed crosses midnight. Rows
//! are read lazily; bad rows are logged and skipped.

use anyhow::{Context, Result};
use chrono::{DateTime, Days, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use super::SignalSource;
use crate::types::{Direction, Signal};

/// A signal this many hours earlier than the previous one belongs to the
/// next day.
const ROLLOVER_GAP_HOURS: i64 = 12;

#[derive(Debug, Deserialize)]
struct SignalRow {
    #[serde(default)]
    asset: String,
    #[serde(default)]
    direction: String,
    #[serde(default)]
    signal_time: String,
    #[serde(default)]
    message_text: String,
    #[serde(default)]
    is_signal: Option<String>,
    #[serde(default)]
    duration: Option<u32>,
}

/// Map channel spellings (`AUDCAD-OTCp`, `AUDCAD-OTC`) to platform asset
/// ids (`AUDCAD_otc`). Other names pass through upper-cased.
pub fn normalize_asset(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    for suffix in ["-OTCP", "-OTC", "_OTC"] {
        if let Some(base) = upper.strip_suffix(suffix) {
            return format!("{base}_otc");
        }
    }
    upper
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

pub struct CsvSignalSource<R = File> {
    rows: ::csv::DeserializeRecordsIntoIter<R, SignalRow>,
    date: NaiveDate,
    last_time: Option<NaiveTime>,
    default_duration: u32,
    line: usize,
}

impl CsvSignalSource<File> {
    /// Open a CSV feed. Signal times are placed on today's local date.
    pub fn open(path: impl AsRef<Path>, default_duration: u32) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open signal file: {}", path.display()))?;
        debug!(path = %path.display(), "Signal file opened");
        Ok(Self::from_reader(file, default_duration))
    }
}

impl<R: Read> CsvSignalSource<R> {
    pub fn from_reader(reader: R, default_duration: u32) -> Self {
        let rows = ::csv::ReaderBuilder::new()
            .flexible(true)
            .trim(::csv::Trim::All)
            .from_reader(reader)
            .into_deserialize();
        Self {
            rows,
            date: Local::now().date_naive(),
            last_time: None,
            default_duration,
            line: 1,
        }
    }

    /// Place signal times on `date` instead of today.
    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// Date for a signal at `time`, rolling past midnight when the feed
    /// jumps far back in the day.
    fn date_for(&mut self, time: NaiveTime) -> NaiveDate {
        if let Some(last) = self.last_time {
            if last - time > Duration::hours(ROLLOVER_GAP_HOURS) {
                if let Some(next) = self.date.checked_add_days(Days::new(1)) {
                    debug!(from = %self.date, to = %next, "Signal feed crossed midnight");
                    self.date = next;
                }
            }
        }
        self.last_time = Some(time);
        self.date
    }

    fn to_signal(&mut self, row: SignalRow) -> Result<Option<Signal>, String> {
        if let Some(flag) = &row.is_signal {
            if !flag.eq_ignore_ascii_case("yes") {
                return Ok(None);
            }
        }
        if row.asset.is_empty() {
            return Err("missing asset".into());
        }
        let direction: Direction = row.direction.parse().map_err(|e| format!("{e}"))?;
        let time = parse_time(&row.signal_time)
            .ok_or_else(|| format!("bad signal_time {:?}", row.signal_time))?;
        let requested_duration = match row.duration {
            Some(0) => return Err("zero duration".into()),
            Some(d) => d,
            None => self.default_duration,
        };
        let date = self.date_for(time);
        let target_time: DateTime<Utc> = Local
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .ok_or_else(|| format!("{date} {time} does not exist locally"))?
            .with_timezone(&Utc);

        Ok(Some(Signal {
            asset: normalize_asset(&row.asset),
            direction,
            target_time,
            requested_duration,
            source_text: row.message_text,
        }))
    }
}

impl<R: Read + Send> SignalSource for CsvSignalSource<R> {
    fn next_signal(&mut self) -> Option<Signal> {
        loop {
            let row = self.rows.next()?;
            self.line += 1;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(line = self.line, error = %e, "Unreadable signal row, skipping");
                    continue;
                }
            };
            match self.to_signal(row) {
                Ok(Some(signal)) => return Some(signal),
                Ok(None) => continue,
                Err(reason) => {
                    warn!(line = self.line, reason = %reason, "Invalid signal row, skipping");
                }
            }
        }
    }
}
