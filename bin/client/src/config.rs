//! Client configuration

use crate::constants::QUEUE_FILE;
use anyhow::{anyhow, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub token: Option<String>,
    pub data_dir: PathBuf,
}

impl ClientConfig {
    pub fn new(server: String, token: Option<String>, data_dir: PathBuf) -> Self {
        Self {
            server: server.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            data_dir,
        }
    }

    /// Get the path to the persisted queue
    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join(QUEUE_FILE)
    }

    pub fn require_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| anyhow!("A bearer token is required. Set --token or CLOUD_TOKEN"))
    }
}
