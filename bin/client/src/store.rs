//! The queue's single persisted record

use crate::queue::QueueState;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A missing file is an empty queue
    pub fn load(&self) -> Result<QueueState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(QueueState::default())
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read queue {:?}", self.path))
            }
        };
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse queue {:?}", self.path))
    }

    /// Temp file plus rename, so a crash mid-write keeps the previous queue
    pub fn save(&self, state: &QueueState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create client data directory")?;
        }
        let json = serde_json::to_string_pretty(state).context("Failed to serialize queue")?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp_path).context("Failed to create temp queue file")?;
        file.write_all(json.as_bytes())
            .context("Failed to write queue")?;
        file.sync_all().context("Failed to sync queue to disk")?;
        drop(file);

        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to move queue into place: {:?}", self.path))
    }

    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove queue {:?}", self.path)),
        }
    }
}
