//! Request audit log
//!
//! Every HTTP call leaves one JSON line in `<log_dir>/log.jsonl`. Writes are
//! serialized through an async mutex so concurrent handlers never interleave
//! partial lines.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

pub const AUDIT_FILE_NAME: &str = "log.jsonl";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize audit entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub status: String,
    pub msg: String,
    pub data: Option<Value>,
    pub elapsed_time: Option<f64>,
}

impl AuditEntry {
    pub fn new(
        endpoint: impl Into<String>,
        status: impl Into<String>,
        msg: impl Into<String>,
        data: Option<Value>,
        elapsed_time: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            endpoint: endpoint.into(),
            status: status.into(),
            msg: msg.into(),
            data,
            elapsed_time,
        }
    }
}

#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    /// Create `dir` if needed and point the log at `dir/log.jsonl`.
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self, AuditError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .map_err(|source| AuditError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: dir.join(AUDIT_FILE_NAME),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let io_err = |source| AuditError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(line.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        Ok(())
    }

    /// Append in the background. Failures are logged, never returned.
    pub fn record(self: &Arc<Self>, entry: AuditEntry) -> JoinHandle<()> {
        let log = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = log.append(&entry).await {
                warn!(error = %e, endpoint = %entry.endpoint, "failed to write audit entry");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn read_entries(path: &Path) -> Vec<AuditEntry> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let log = AuditLog::open(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert_eq!(log.path(), nested.join(AUDIT_FILE_NAME).as_path());
    }

    #[tokio::test]
    async fn appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path()).await.unwrap();

        let first = AuditEntry::new(
            "/easy",
            "success",
            "OK",
            Some(json!({"sentence": "s"})),
            Some(0.5),
        );
        let second = AuditEntry::new("/keyword", "error", "bad keys", None, None);
        log.append(&first).await.unwrap();
        log.append(&second).await.unwrap();

        let entries = read_entries(log.path());
        assert_eq!(entries, vec![first, second]);
    }

    #[tokio::test]
    async fn concurrent_records_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(AuditLog::open(dir.path()).await.unwrap());

        let handles: Vec<_> = (0..20)
            .map(|i| {
                log.record(AuditEntry::new(
                    format!("/e{}", i),
                    "success",
                    "x".repeat(512),
                    None,
                    Some(i as f64),
                ))
            })
            .collect();
        futures::future::join_all(handles).await;

        let entries = read_entries(log.path());
        assert_eq!(entries.len(), 20);
        let ids: std::collections::BTreeSet<_> = entries.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids.len(), 20);
    }
}
