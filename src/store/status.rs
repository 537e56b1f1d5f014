// src/store/status.rs
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::{read_json_or_default, write_json_atomic};
use crate::job::JobStatus;

/// Snapshot of the scan job, rewritten on every state transition.
///
/// Clones share the sequence of the last snapshot written, so writes issued
/// out of order (e.g. from blocking tasks) never roll the file back.
#[derive(Debug, Clone)]
pub struct JobStatusStore {
    path: PathBuf,
    last_written: Arc<Mutex<u64>>,
}

impl JobStatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_written: Arc::new(Mutex::new(0)),
        }
    }

    /// Best-effort: a failed write is logged, never propagated.
    pub fn save(&self, status: &JobStatus) {
        if let Err(e) = write_json_atomic(&self.path, status) {
            tracing::warn!(
                target: "store",
                path = %self.path.display(), error = %e,
                "job status not persisted"
            );
        }
    }

    /// Like `save`, but skipped when a snapshot with a higher `seq` is already on disk.
    pub fn save_ordered(&self, seq: u64, status: &JobStatus) {
        let mut last = self.last_written.lock().unwrap_or_else(|e| e.into_inner());
        if seq <= *last {
            tracing::debug!(target: "store", seq, last = *last, "stale job status dropped");
            return;
        }
        self.save(status);
        *last = seq;
    }

    pub fn load(&self) -> Option<JobStatus> {
        read_json_or_default::<Option<JobStatus>>(&self.path).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStatusStore::new(dir.path().join("scan_status.json"));
        assert!(store.load().is_none());
        store.save(&JobStatus {
            state: JobState::Running,
            progress_percent: 40,
        });
        let back = store.load().unwrap();
        assert_eq!(back.state, JobState::Running);
        assert_eq!(back.progress_percent, 40);
        let raw = std::fs::read_to_string(dir.path().join("scan_status.json")).unwrap();
        assert!(raw.contains("\"running\""));
    }

    #[test]
    fn stale_snapshot_does_not_overwrite_newer_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStatusStore::new(dir.path().join("scan_status.json"));
        let done = JobStatus {
            state: JobState::Done,
            progress_percent: 100,
        };
        let running = JobStatus {
            state: JobState::Running,
            progress_percent: 0,
        };
        store.save_ordered(2, &done);
        store.clone().save_ordered(1, &running);
        assert_eq!(store.load(), Some(done));
    }
}
