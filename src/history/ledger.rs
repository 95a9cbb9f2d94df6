use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::history::types::AppClickHistory;

const LEDGER_FILE: &str = "click_history.json";

/// Persistence collaborator for per-app click ledgers.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// `Ok(None)` means the app has no history yet.
    async fn read(&self, app_name: &str) -> ScreenPointResult<Option<AppClickHistory>>;

    async fn write(&self, history: &AppClickHistory) -> ScreenPointResult<()>;

    /// Deleting a ledger that does not exist is not an error.
    async fn delete(&self, app_name: &str) -> ScreenPointResult<()>;
}

pub type DynLedgerStore = Arc<dyn LedgerStore>;

/// Lowercases and replaces every non-alphanumeric character with `_`.
pub fn sanitize_app_name(app_name: &str) -> String {
    let sanitized: String = app_name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// Pretty JSON ledger at `<root>/<sanitized app>/click_history.json`.
pub struct JsonFileLedger {
    root: PathBuf,
    io_timeout: Duration,
}

impl JsonFileLedger {
    pub fn new(root: PathBuf, io_timeout: Duration) -> Self {
        Self { root, io_timeout }
    }

    pub fn path_for(&self, app_name: &str) -> PathBuf {
        self.root.join(sanitize_app_name(app_name)).join(LEDGER_FILE)
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> ScreenPointResult<T>
    where
        F: std::future::Future<Output = std::io::Result<T>>,
    {
        match tokio::time::timeout(self.io_timeout, fut).await {
            Ok(result) => result.map_err(ScreenPointError::from),
            Err(_) => Err(ScreenPointError::Timeout {
                operation,
                millis: self.io_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl LedgerStore for JsonFileLedger {
    async fn read(&self, app_name: &str) -> ScreenPointResult<Option<AppClickHistory>> {
        let path = self.path_for(app_name);
        let bytes = match self.timed("ledger read", tokio::fs::read(&path)).await {
            Ok(bytes) => bytes,
            Err(ScreenPointError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no ledger yet");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let history = serde_json::from_slice(&bytes).map_err(|e| {
            ScreenPointError::Persistence(format!("corrupt ledger {}: {e}", path.display()))
        })?;
        Ok(Some(history))
    }

    async fn write(&self, history: &AppClickHistory) -> ScreenPointResult<()> {
        let path = self.path_for(&history.app_name);
        let Some(dir) = path.parent() else {
            return Err(ScreenPointError::Persistence(format!("bad ledger path {}", path.display())));
        };
        let body = serde_json::to_vec_pretty(history)?;
        let tmp = path.with_extension("json.tmp");

        self.timed("ledger write", async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&tmp, &body).await?;
            tokio::fs::rename(&tmp, &path).await
        })
        .await?;

        tracing::debug!(path = %path.display(), clicks = history.clicks.len(), "ledger written");
        Ok(())
    }

    async fn delete(&self, app_name: &str) -> ScreenPointResult<()> {
        let path = self.path_for(app_name);
        match self.timed("ledger delete", tokio::fs::remove_file(&path)).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "ledger deleted");
                Ok(())
            }
            Err(ScreenPointError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ledger(dir: &tempfile::TempDir) -> JsonFileLedger {
        JsonFileLedger::new(dir.path().to_path_buf(), Duration::from_secs(5))
    }

    #[test]
    fn sanitizes_app_names() {
        assert_eq!(sanitize_app_name("Google Chrome"), "google_chrome");
        assert_eq!(sanitize_app_name("Visual Studio Code.app"), "visual_studio_code_app");
        assert_eq!(sanitize_app_name("  "), "unknown");
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ledger(&dir).read("Safari").await.unwrap().is_none());
        ledger(&dir).delete("Safari").await.unwrap();
    }

    #[tokio::test]
    async fn write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ledger(&dir);
        let history = AppClickHistory {
            app_name: "Finder".into(),
            last_updated: Utc::now(),
            clicks: Vec::new(),
            counter: 4,
        };
        store.write(&history).await.unwrap();
        assert!(dir.path().join("finder").join(LEDGER_FILE).exists());
        assert_eq!(store.read("Finder").await.unwrap(), Some(history));
        store.delete("Finder").await.unwrap();
        assert!(store.read("Finder").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_ledger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ledger(&dir);
        let path = store.path_for("Notes");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(store.read("Notes").await, Err(ScreenPointError::Persistence(_))));
    }
}
