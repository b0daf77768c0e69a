use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CounterConfig {
    #[serde(default = "default_counter_path")]
    pub path: PathBuf,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            path: default_counter_path(),
        }
    }
}

fn default_counter_path() -> PathBuf {
    PathBuf::from("visitor_data.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CounterData {
    total_visits: u64,
    #[serde(default)]
    unique_sessions: BTreeSet<String>,
    first_visit: u64,
    last_visit: u64,
}

impl CounterData {
    fn fresh() -> Self {
        let now = now_epoch_secs();
        Self {
            total_visits: 0,
            unique_sessions: BTreeSet::new(),
            first_visit: now,
            last_visit: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorStats {
    pub total_visits: u64,
    pub unique_visitors: usize,
    pub first_visit: u64,
    pub last_visit: u64,
}

/// Visit counter persisted as a small JSON file.
///
/// Every call re-reads the file, so edits made by hand between calls are
/// picked up. Calls are serialized within the process; running two processes
/// on the same file is not supported. The file I/O is blocking.
#[derive(Debug)]
pub struct VisitorCounter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl VisitorCounter {
    /// Opens the counter, creating the file if it doesn't exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            info!("Creating visitor counter file {}", path.display());
            save(&path, &CounterData::fresh())?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records one visit and returns the new total. `visitor` is an opaque id
    /// used to count unique visitors.
    pub fn increment(&self, visitor: Option<&str>) -> Result<u64> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("visitor counter lock poisoned"))?;

        let mut data = load(&self.path);
        data.total_visits += 1;
        data.last_visit = now_epoch_secs();
        if let Some(id) = visitor.filter(|id| !id.is_empty()) {
            data.unique_sessions.insert(id.to_string());
        }
        save(&self.path, &data)?;
        Ok(data.total_visits)
    }

    pub fn get_stats(&self) -> Result<VisitorStats> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("visitor counter lock poisoned"))?;

        let data = load(&self.path);
        Ok(VisitorStats {
            total_visits: data.total_visits,
            unique_visitors: data.unique_sessions.len(),
            first_visit: data.first_visit,
            last_visit: data.last_visit,
        })
    }

    pub fn reset(&self) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("visitor counter lock poisoned"))?;
        save(&self.path, &CounterData::fresh())
    }
}

/// Unreadable or corrupt files count as a fresh counter.
fn load(path: &Path) -> CounterData {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Failed to read visitor counter {}: {}", path.display(), e);
            return CounterData::fresh();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(data) => data,
        Err(e) => {
            warn!("Corrupt visitor counter {}: {}", path.display(), e);
            CounterData::fresh()
        }
    }
}

fn save(path: &Path, data: &CounterData) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    std::fs::write(path, json)
        .with_context(|| format!("writing visitor counter {}", path.display()))
}
