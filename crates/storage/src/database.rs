//! PostgreSQL database storage implementation

mod queries;
mod schema;

use crate::error::{StorageError, StorageResult};
use crate::models::{CommitOutcome, FileKind, FileMetadata, NewFile, Principal, QuotaRecord};
use crate::Storage;
use anyhow::Context;
use async_trait::async_trait;
use queries::Queries;
use schema::Schema;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_DELAY_SECONDS: u64 = 1;

/// Connection retry policy used while the database is still starting up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatabaseRetryConfig {
    pub max_attempts: u32,
    pub initial_delay_seconds: u64,
}

impl Default for DatabaseRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_seconds: DEFAULT_INITIAL_DELAY_SECONDS,
        }
    }
}

impl DatabaseRetryConfig {
    /// Read `DB_CONNECT_MAX_ATTEMPTS` and `DB_CONNECT_INITIAL_DELAY_SECONDS`,
    /// falling back to the defaults for missing or unparsable values
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: std::env::var("DB_CONNECT_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_attempts),
            initial_delay_seconds: std::env::var("DB_CONNECT_INITIAL_DELAY_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.initial_delay_seconds),
        }
    }

    /// Delay before attempt `attempt + 1`, doubling each time
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_secs(self.initial_delay_seconds.saturating_mul(factor))
    }
}

/// PostgreSQL database storage implementation
pub struct DatabaseStorage {
    pool: PgPool,
}

impl DatabaseStorage {
    /// Connect with retries, then make sure the schema exists
    pub async fn connect(database_url: &str, retry: DatabaseRetryConfig) -> anyhow::Result<Self> {
        let mut attempt = 1;
        let pool = loop {
            match PgPool::connect(database_url).await {
                Ok(pool) => break pool,
                Err(e) if attempt < retry.max_attempts => {
                    let delay = retry.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = retry.max_attempts,
                        "Database connection failed: {}. Retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "Failed to connect to PostgreSQL database after {} attempts",
                            attempt
                        )
                    })
                }
            }
        };

        Schema::initialize(&pool).await?;
        info!("Connected to PostgreSQL after {} attempt(s)", attempt);
        Ok(Self { pool })
    }

    fn principal_not_found(principal_id: &str) -> StorageError {
        StorageError::NotFound(format!("Principal {}", principal_id))
    }
}

#[async_trait]
impl Storage for DatabaseStorage {
    async fn create_principal(
        &self,
        principal_id: &str,
        token_hash: &str,
        max_storage: u64,
    ) -> StorageResult<Principal> {
        if !Queries::insert_principal(&self.pool, principal_id, token_hash, max_storage).await? {
            return Err(StorageError::Conflict(format!(
                "Principal {} or its token already exists",
                principal_id
            )));
        }
        Ok(Principal {
            id: principal_id.to_string(),
            quota: QuotaRecord::new(max_storage),
            root_container_id: None,
        })
    }

    async fn principal_for_token(&self, token_hash: &str) -> StorageResult<Option<String>> {
        Ok(Queries::principal_for_token(&self.pool, token_hash).await?)
    }

    async fn load_principal(&self, principal_id: &str) -> StorageResult<Principal> {
        let (quota, root_container_id) = Queries::load_principal(&self.pool, principal_id)
            .await?
            .ok_or_else(|| Self::principal_not_found(principal_id))?;
        Ok(Principal {
            id: principal_id.to_string(),
            quota,
            root_container_id,
        })
    }

    async fn set_root_container(
        &self,
        principal_id: &str,
        container_id: &str,
    ) -> StorageResult<String> {
        Queries::set_root_container(&self.pool, principal_id, container_id)
            .await?
            .ok_or_else(|| Self::principal_not_found(principal_id))
    }

    async fn commit_upload(&self, file: NewFile) -> StorageResult<CommitOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        if let Some(existing) =
            Queries::find_by_provider_object(&mut *tx, &file.provider_object_id).await?
        {
            return CommitOutcome::existing(existing, &file.owner_id);
        }

        // The conditional UPDATE takes the principal row lock, so concurrent
        // commits for the same owner serialize here.
        if Queries::try_charge(&mut *tx, &file.owner_id, file.size)
            .await?
            .is_none()
        {
            let (quota, _) = Queries::load_principal(&mut *tx, &file.owner_id)
                .await?
                .ok_or_else(|| Self::principal_not_found(&file.owner_id))?;
            return Err(StorageError::QuotaExceeded {
                requested: file.size,
                used: quota.used_storage,
                max: quota.max_storage,
            });
        }

        let owner_id = file.owner_id.clone();
        let provider_object_id = file.provider_object_id.clone();
        let record = file.into_metadata();

        if !Queries::insert_file(&mut *tx, &record).await? {
            // Lost a race with another commit of the same object; dropping the
            // transaction rolls back the charge.
            drop(tx);
            let existing = Queries::find_by_provider_object(&self.pool, &provider_object_id)
                .await?
                .ok_or_else(|| {
                    StorageError::NotFound(format!("Provider object {}", provider_object_id))
                })?;
            return CommitOutcome::existing(existing, &owner_id);
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(CommitOutcome::Created(record))
    }

    async fn release(&self, principal_id: &str, bytes: u64) -> StorageResult<QuotaRecord> {
        Queries::release(&self.pool, principal_id, bytes)
            .await?
            .ok_or_else(|| Self::principal_not_found(principal_id))
    }

    async fn recompute_usage(&self, principal_id: &str) -> StorageResult<QuotaRecord> {
        Queries::recompute_usage(&self.pool, principal_id)
            .await?
            .ok_or_else(|| Self::principal_not_found(principal_id))
    }

    async fn insert_folder(&self, folder: NewFile) -> StorageResult<FileMetadata> {
        let record = NewFile {
            kind: FileKind::Folder,
            size: 0,
            ..folder
        }
        .into_metadata();
        if !Queries::insert_file(&self.pool, &record).await? {
            return Err(StorageError::Conflict(format!(
                "Provider object {} is already indexed",
                record.provider_object_id
            )));
        }
        Ok(record)
    }

    async fn find_file(&self, id: &str) -> StorageResult<Option<FileMetadata>> {
        Ok(Queries::find_file(&self.pool, id).await?)
    }

    async fn find_by_provider_object(
        &self,
        provider_object_id: &str,
    ) -> StorageResult<Option<FileMetadata>> {
        Ok(Queries::find_by_provider_object(&self.pool, provider_object_id).await?)
    }

    async fn list_children(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StorageResult<Vec<FileMetadata>> {
        Ok(Queries::list_children(&self.pool, owner_id, parent_id).await?)
    }

    async fn delete_file(&self, id: &str) -> StorageResult<Option<FileMetadata>> {
        Ok(Queries::delete_file(&self.pool, id).await?)
    }
}
