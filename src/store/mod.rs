//! File-backed state: seen links, the alert log and the job status snapshot.
//!
//! Reads are fail-open: a missing or corrupt file loads as the empty value and
//! is overwritten on the next successful write. Writes go through a temp file
//! and a rename so a crash never leaves a half-written record behind.

pub mod alerts;
pub mod seen;
pub mod status;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use alerts::{Alert, AlertStore};
pub use seen::SeenStore;
pub use status::JobStatusStore;

pub const SEEN_FILE: &str = "seen_entries.json";
pub const ALERTS_FILE: &str = "alerts.json";
pub const STATUS_FILE: &str = "scan_status.json";

/// Locations of every persisted record under one data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub seen: PathBuf,
    pub alerts: PathBuf,
    pub status: PathBuf,
}

impl DataPaths {
    pub fn under(dir: &Path) -> Self {
        Self {
            seen: dir.join(SEEN_FILE),
            alerts: dir.join(ALERTS_FILE),
            status: dir.join(STATUS_FILE),
        }
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "store_fallbacks_total",
            "Persisted records that were missing or corrupt and loaded as empty."
        );
        describe_counter!("store_write_errors_total", "Failed persistence writes.");
        describe_counter!("alerts_appended_total", "Alerts appended to the alert log.");
    });
}

/// How a fail-open read ended; only `Corrupt` is worth a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Missing,
    Corrupt,
}

/// Read `path` as JSON, falling back to `T::default()` when absent or unparseable.
pub(crate) fn read_json_or_default<T>(path: &Path) -> (T, LoadOutcome)
where
    T: DeserializeOwned + Default,
{
    ensure_metrics_described();
    let raw = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return (T::default(), LoadOutcome::Missing),
        Err(e) => {
            tracing::warn!(
                target: "store",
                path = %path.display(), error = %e, reason = "unreadable",
                "persistence fallback: loading empty"
            );
            counter!("store_fallbacks_total").increment(1);
            return (T::default(), LoadOutcome::Corrupt);
        }
    };
    match serde_json::from_str(&raw) {
        Ok(v) => (v, LoadOutcome::Loaded),
        Err(e) => {
            tracing::warn!(
                target: "store",
                path = %path.display(), error = %e, reason = "corrupt",
                "persistence fallback: loading empty"
            );
            counter!("store_fallbacks_total").increment(1);
            (T::default(), LoadOutcome::Corrupt)
        }
    }
}

/// Pretty JSON, written to `<path>.tmp` then renamed over `path`.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    ensure_metrics_described();
    let res = (|| {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&json)?;
        f.sync_all()?;
        fs::rename(tmp, path)
    })();
    if res.is_err() {
        counter!("store_write_errors_total").increment(1);
    }
    res
}
