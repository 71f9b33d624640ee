use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// JSON record files on disk
pub struct Records;

impl Records {
    /// Load a record, `None` if the file does not exist
    pub async fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read record {:?}", path))
            }
        };
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse record {:?}", path))?;
        Ok(Some(value))
    }

    /// Write a record through a synced temp file and rename it into place,
    /// so a crash never leaves a half-written record visible
    pub async fn save_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value).context("Failed to serialize record")?;
        let tmp_path = path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .context("Failed to create temp record file")?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write record")?;
        file.sync_all()
            .await
            .context("Failed to sync record to disk")?;
        drop(file);

        tokio::fs::rename(&tmp_path, path)
            .await
            .with_context(|| format!("Failed to move record into place: {:?}", path))?;
        Ok(())
    }

    /// Remove a record; returns whether it existed
    pub async fn remove(path: &Path) -> Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove record {:?}", path)),
        }
    }

    /// Load every `*.json` record in a directory
    pub async fn load_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
        let mut records = Vec::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e).context("Failed to read record directory"),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = Self::load(&path).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// Ids become file names, so only a conservative charset is accepted
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
