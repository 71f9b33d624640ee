//! Upload items and their state machine

use crate::constants::DEFAULT_CONCURRENCY;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Error,
    Paused,
}

impl UploadStatus {
    /// Edges of the per-item state machine
    pub fn can_become(self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Pending, Paused)
                | (Uploading, Completed)
                | (Uploading, Error)
                | (Uploading, Paused)
                | (Uploading, Pending)
                | (Error, Pending)
                | (Error, Paused)
                | (Paused, Pending)
        )
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Error => "error",
            UploadStatus::Paused => "paused",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("unknown upload item {0}")]
    UnknownItem(String),
    #[error("item {id} cannot go from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: UploadStatus,
        to: UploadStatus,
    },
    #[error("{0}")]
    Mismatch(String),
}

/// One upload intent. The file bytes are never part of it; see `ChunkSource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItem {
    pub id: String,
    pub file_name: String,
    pub size: u64,
    pub mime_type: String,
    pub status: UploadStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

impl UploadItem {
    pub fn new(
        id: String,
        file_name: String,
        size: u64,
        mime_type: String,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            id,
            file_name,
            size,
            mime_type,
            status: UploadStatus::Pending,
            progress: 0,
            error: None,
            session_url: None,
            unique_file_name: None,
            parent_id,
            file_id: None,
            retry_count: 0,
        }
    }

    pub fn transition(&mut self, next: UploadStatus) -> Result<(), QueueError> {
        if !self.status.can_become(next) {
            return Err(QueueError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Progress only moves forward and stays below 100 until completion
    pub fn advance_progress(&mut self, percent: u8) {
        self.progress = self.progress.max(percent.min(99));
    }

    pub fn complete(&mut self, file_id: String) -> Result<(), QueueError> {
        self.transition(UploadStatus::Completed)?;
        self.progress = 100;
        self.file_id = Some(file_id);
        self.error = None;
        self.session_url = None;
        Ok(())
    }

    pub fn fail(&mut self, message: String) -> Result<(), QueueError> {
        self.transition(UploadStatus::Error)?;
        self.error = Some(message);
        Ok(())
    }

    pub fn forget_session(&mut self) {
        self.session_url = None;
        self.unique_file_name = None;
    }
}

/// The persisted record: `{queue, concurrency}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    pub queue: Vec<UploadItem>,
    pub concurrency: usize,
}

impl Default for QueueState {
    fn default() -> Self {
        Self {
            queue: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl QueueState {
    pub fn get(&self, id: &str) -> Option<&UploadItem> {
        self.queue.iter().find(|item| item.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut UploadItem, QueueError> {
        self.queue
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| QueueError::UnknownItem(id.to_string()))
    }

    pub fn remove(&mut self, id: &str) -> Option<UploadItem> {
        let index = self.queue.iter().position(|item| item.id == id)?;
        Some(self.queue.remove(index))
    }

    /// One-time reset after loading from disk: unfinished items go back to
    /// `pending` when their bytes are still at hand, else wait in `paused`.
    pub fn rehydrate(&mut self, has_source: impl Fn(&str) -> bool) {
        for item in &mut self.queue {
            if matches!(
                item.status,
                UploadStatus::Pending | UploadStatus::Uploading | UploadStatus::Paused
            ) {
                item.status = if has_source(&item.id) {
                    UploadStatus::Pending
                } else {
                    UploadStatus::Paused
                };
            }
        }
        if self.concurrency == 0 {
            self.concurrency = DEFAULT_CONCURRENCY;
        }
    }
}
