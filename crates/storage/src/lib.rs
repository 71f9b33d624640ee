pub mod backend;
pub mod database;
pub mod error;
pub mod filesystem;
pub mod models;

use async_trait::async_trait;

pub use backend::StorageBackend;
pub use database::DatabaseRetryConfig;
pub use error::{StorageError, StorageResult};
pub use models::{CommitOutcome, FileKind, FileMetadata, NewFile, Principal, QuotaRecord};

/// Metadata index and quota ledger.
///
/// Ledger mutations are atomic per principal: `commit_upload` checks the
/// limit, writes the record and charges the quota as one step, so two
/// concurrent finalizations can never push `used_storage` past `max_storage`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Register a principal with an empty ledger.
    /// Fails with `Conflict` if the id or token is already taken.
    async fn create_principal(
        &self,
        principal_id: &str,
        token_hash: &str,
        max_storage: u64,
    ) -> StorageResult<Principal>;

    /// Resolve a bearer token digest to its principal id
    async fn principal_for_token(&self, token_hash: &str) -> StorageResult<Option<String>>;

    /// Load a principal; `NotFound` if unknown
    async fn load_principal(&self, principal_id: &str) -> StorageResult<Principal>;

    /// Record the provider folder serving as the principal's root container.
    /// The first recorded root is kept; returns the root now in effect.
    async fn set_root_container(
        &self,
        principal_id: &str,
        container_id: &str,
    ) -> StorageResult<String>;

    /// Current ledger entry
    async fn quota(&self, principal_id: &str) -> StorageResult<QuotaRecord> {
        Ok(self.load_principal(principal_id).await?.quota)
    }

    /// Index a finished upload and charge its size in one atomic step.
    /// Re-committing an object already indexed for the same owner returns the
    /// existing record and charges nothing; an object indexed for another
    /// owner fails with `Conflict`.
    async fn commit_upload(&self, file: NewFile) -> StorageResult<CommitOutcome>;

    /// Credit bytes back to a principal, floored at zero
    async fn release(&self, principal_id: &str, bytes: u64) -> StorageResult<QuotaRecord>;

    /// Rebuild `used_storage` from the indexed file sizes
    async fn recompute_usage(&self, principal_id: &str) -> StorageResult<QuotaRecord>;

    /// Index a container; containers carry no size and are never charged
    async fn insert_folder(&self, folder: NewFile) -> StorageResult<FileMetadata>;

    async fn find_file(&self, id: &str) -> StorageResult<Option<FileMetadata>>;

    /// The record indexing a provider object, whoever owns it
    async fn find_by_provider_object(
        &self,
        provider_object_id: &str,
    ) -> StorageResult<Option<FileMetadata>>;

    /// Records directly under `parent_id` (the root container when `None`)
    async fn list_children(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StorageResult<Vec<FileMetadata>>;

    /// Remove one record, returning it if it existed
    async fn delete_file(&self, id: &str) -> StorageResult<Option<FileMetadata>>;
}
