use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowState {
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStatus {
    pub status: FlowState,
    pub message: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub stats: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// File-backed board of per-flow import status, shared by the API and the CLI.
///
/// Writes are serialized through one lock; reads go straight to the file so a
/// board opened by another process sees the latest state.
#[derive(Debug)]
pub struct StatusBoard {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StatusBoard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn update(
        &self,
        flow: &str,
        status: FlowState,
        message: impl Into<String>,
        stats: Option<serde_json::Value>,
    ) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut board = self.load().await;
        let now = Utc::now();
        board.insert(
            flow.to_string(),
            FlowStatus {
                status,
                message: message.into(),
                progress: None,
                stats,
                timestamp: now,
                last_updated: now,
            },
        );
        self.save(&board).await
    }

    pub async fn get(&self, flow: &str) -> Option<FlowStatus> {
        self.load().await.remove(flow)
    }

    pub async fn all(&self) -> BTreeMap<String, FlowStatus> {
        self.load().await
    }

    /// Drops one flow, or every flow when `flow` is `None`.
    pub async fn clear(&self, flow: Option<&str>) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let board = match flow {
            Some(flow) => {
                let mut board = self.load().await;
                board.remove(flow);
                board
            }
            None => BTreeMap::new(),
        };
        self.save(&board).await
    }

    async fn load(&self) -> BTreeMap<String, FlowStatus> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "status file unreadable");
                return BTreeMap::new();
            }
        };
        serde_json::from_slice(&raw).unwrap_or_else(|err| {
            warn!(path = %self.path.display(), error = %err, "status file corrupt, starting empty");
            BTreeMap::new()
        })
    }

    async fn save(&self, board: &BTreeMap<String, FlowStatus>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating status directory {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(board).context("encoding import status")?;
        fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing status file {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn update_then_get_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let board = StatusBoard::new(dir.path().join("status.json"));
        board
            .update("nav", FlowState::Completed, "done", Some(json!({"nav_created": 3})))
            .await
            .unwrap();

        let reopened = StatusBoard::new(dir.path().join("status.json"));
        let status = reopened.get("nav").await.unwrap();
        assert_eq!(status.status, FlowState::Completed);
        assert_eq!(status.stats, Some(json!({"nav_created": 3})));
    }

    #[tokio::test]
    async fn clear_one_flow_keeps_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let board = StatusBoard::new(dir.path().join("status.json"));
        board.update("nav", FlowState::Running, "go", None).await.unwrap();
        board.update("returns", FlowState::Error, "boom", None).await.unwrap();

        board.clear(Some("nav")).await.unwrap();
        let all = board.all().await;
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["returns"]);

        board.clear(None).await.unwrap();
        assert!(board.all().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        std::fs::write(&path, b"{not json").unwrap();
        let board = StatusBoard::new(&path);
        assert!(board.all().await.is_empty());
        assert!(board.get("nav").await.is_none());
    }
}
