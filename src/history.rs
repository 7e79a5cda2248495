//! Change history tracker.
//!
//! Local append-only ledger of daily commit deltas per node, persisted as
//! JSON outside the remote store. Deltas within a day accumulate by
//! summation; entries are never trimmed. Corrupt or missing persisted data
//! resets to an empty ledger — losing history is acceptable, failing to
//! start is not.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{error, warn};

use crate::error::SyncError;

/// node id → (day → accumulated signed commit delta)
type LedgerMap = HashMap<String, BTreeMap<NaiveDate, i64>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    entries: LedgerMap,
}

/// Append-only ledger of daily commit deltas.
#[derive(Debug)]
pub struct HistoryLedger {
    path: PathBuf,
    entries: RwLock<LedgerMap>,
}

impl HistoryLedger {
    /// Load the ledger from `path`, resetting to empty on missing or
    /// corrupt data.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<LedgerFile>(&contents) {
                Ok(file) => file.entries,
                Err(e) => {
                    warn!(path = %path.display(), "corrupt history ledger, resetting: {e}");
                    LedgerMap::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerMap::default(),
            Err(e) => {
                warn!(path = %path.display(), "unreadable history ledger, resetting: {e}");
                LedgerMap::default()
            }
        };
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    /// An in-memory ledger backed by a file that does not exist yet.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(LedgerMap::default()),
        }
    }

    /// Today's calendar date in local time, the day key for live appends.
    pub fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    /// Accumulate a signed commit delta for a node on a day, then persist.
    ///
    /// A zero delta is a no-op. Persistence failures are logged and
    /// swallowed; the in-memory ledger stays authoritative for the session.
    pub fn append(&self, node_id: &str, delta: i64, day: NaiveDate) {
        if delta == 0 {
            return;
        }
        {
            let mut entries = self.entries.write().expect("history ledger poisoned");
            *entries
                .entry(node_id.to_string())
                .or_default()
                .entry(day)
                .or_insert(0) += delta;
        }
        if let Err(e) = self.persist() {
            error!("failed to persist history ledger: {e}");
        }
    }

    /// Accumulated delta for a node on a day, 0 if absent.
    pub fn query(&self, node_id: &str, day: NaiveDate) -> i64 {
        self.entries
            .read()
            .expect("history ledger poisoned")
            .get(node_id)
            .and_then(|days| days.get(&day))
            .copied()
            .unwrap_or(0)
    }

    /// Per-day deltas for a node over the last `days` calendar days ending
    /// today, most recent first. Used by the acute-panel style report.
    pub fn recent(&self, node_id: &str, days: u32) -> Vec<(NaiveDate, i64)> {
        let today = Self::today();
        (0..days as i64)
            .map(|back| {
                let day = today - chrono::Duration::days(back);
                (day, self.query(node_id, day))
            })
            .collect()
    }

    /// Where the ledger persists.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), SyncError> {
        let entries = self.entries.read().expect("history ledger poisoned");
        let file = LedgerFile {
            entries: entries.clone(),
        };
        let json = serde_json::to_string(&file)
            .map_err(|e| SyncError::Persistence(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::Persistence(e.to_string()))?;
        }
        std::fs::write(&self.path, json).map_err(|e| SyncError::Persistence(e.to_string()))
    }
}
