//! Filesystem-based storage implementation

mod records;

use crate::error::{StorageError, StorageResult};
use crate::models::{CommitOutcome, FileKind, FileMetadata, NewFile, Principal, QuotaRecord};
use crate::Storage;
use anyhow::Context;
use async_trait::async_trait;
use records::{is_safe_id, Records};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::info;

const PRINCIPALS_DIR: &str = "principals";
const FILES_DIR: &str = "files";

#[derive(Serialize, Deserialize, Clone, Debug)]
struct PrincipalEntry {
    #[serde(flatten)]
    principal: Principal,
    token_hash: String,
}

/// Filesystem-based storage implementation.
///
/// One JSON record per principal and per file. Every mutation runs under a
/// single store-wide lock, which is what makes the ledger check-and-charge
/// atomic for this backend.
pub struct FilesystemStorage {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FilesystemStorage {
    pub async fn open(data_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        for dir in [PRINCIPALS_DIR, FILES_DIR] {
            tokio::fs::create_dir_all(data_dir.join(dir))
                .await
                .with_context(|| format!("Failed to create {} directory", dir))?;
        }
        info!("Filesystem storage initialized at {:?}", data_dir);
        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn principal_path(&self, principal_id: &str) -> PathBuf {
        self.data_dir
            .join(PRINCIPALS_DIR)
            .join(format!("{}.json", principal_id))
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.data_dir.join(FILES_DIR).join(format!("{}.json", id))
    }

    async fn load_entry(&self, principal_id: &str) -> StorageResult<PrincipalEntry> {
        if !is_safe_id(principal_id) {
            return Err(StorageError::NotFound(format!("Principal {}", principal_id)));
        }
        Records::load::<PrincipalEntry>(&self.principal_path(principal_id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Principal {}", principal_id)))
    }

    async fn save_entry(&self, entry: &PrincipalEntry) -> StorageResult<()> {
        Records::save_atomic(&self.principal_path(&entry.principal.id), entry).await?;
        Ok(())
    }

    async fn all_files(&self) -> StorageResult<Vec<FileMetadata>> {
        Ok(Records::load_all(&self.data_dir.join(FILES_DIR)).await?)
    }

    async fn by_provider_object(
        &self,
        provider_object_id: &str,
    ) -> StorageResult<Option<FileMetadata>> {
        Ok(self
            .all_files()
            .await?
            .into_iter()
            .find(|f| f.provider_object_id == provider_object_id))
    }
}

#[async_trait]
impl Storage for FilesystemStorage {
    async fn create_principal(
        &self,
        principal_id: &str,
        token_hash: &str,
        max_storage: u64,
    ) -> StorageResult<Principal> {
        if !is_safe_id(principal_id) {
            return Err(StorageError::Conflict(format!(
                "Invalid principal id: {}",
                principal_id
            )));
        }

        let _guard = self.write_lock.lock().await;

        let existing: Vec<PrincipalEntry> =
            Records::load_all(&self.data_dir.join(PRINCIPALS_DIR)).await?;
        if existing.iter().any(|e| e.principal.id == principal_id) {
            return Err(StorageError::Conflict(format!(
                "Principal {} already exists",
                principal_id
            )));
        }
        if existing.iter().any(|e| e.token_hash == token_hash) {
            return Err(StorageError::Conflict("Token already in use".to_string()));
        }

        let entry = PrincipalEntry {
            principal: Principal {
                id: principal_id.to_string(),
                quota: QuotaRecord::new(max_storage),
                root_container_id: None,
            },
            token_hash: token_hash.to_string(),
        };
        self.save_entry(&entry).await?;
        Ok(entry.principal)
    }

    async fn principal_for_token(&self, token_hash: &str) -> StorageResult<Option<String>> {
        let entries: Vec<PrincipalEntry> =
            Records::load_all(&self.data_dir.join(PRINCIPALS_DIR)).await?;
        Ok(entries
            .into_iter()
            .find(|e| e.token_hash == token_hash)
            .map(|e| e.principal.id))
    }

    async fn load_principal(&self, principal_id: &str) -> StorageResult<Principal> {
        Ok(self.load_entry(principal_id).await?.principal)
    }

    async fn set_root_container(
        &self,
        principal_id: &str,
        container_id: &str,
    ) -> StorageResult<String> {
        let _guard = self.write_lock.lock().await;
        let mut entry = self.load_entry(principal_id).await?;
        if let Some(root) = entry.principal.root_container_id {
            return Ok(root);
        }
        entry.principal.root_container_id = Some(container_id.to_string());
        self.save_entry(&entry).await?;
        Ok(container_id.to_string())
    }

    async fn commit_upload(&self, file: NewFile) -> StorageResult<CommitOutcome> {
        let _guard = self.write_lock.lock().await;

        if let Some(existing) = self.by_provider_object(&file.provider_object_id).await? {
            return CommitOutcome::existing(existing, &file.owner_id);
        }

        let mut entry = self.load_entry(&file.owner_id).await?;
        let charged = entry.principal.quota.allocate(file.size)?;

        // Record first, then ledger: if the ledger write fails the record is
        // rolled back so no metadata survives a failed commit.
        let record = file.into_metadata();
        Records::save_atomic(&self.file_path(&record.id), &record).await?;

        entry.principal.quota = charged;
        if let Err(e) = self.save_entry(&entry).await {
            Records::remove(&self.file_path(&record.id)).await?;
            return Err(e);
        }

        Ok(CommitOutcome::Created(record))
    }

    async fn release(&self, principal_id: &str, bytes: u64) -> StorageResult<QuotaRecord> {
        let _guard = self.write_lock.lock().await;
        let mut entry = self.load_entry(principal_id).await?;
        entry.principal.quota = entry.principal.quota.release(bytes);
        self.save_entry(&entry).await?;
        Ok(entry.principal.quota)
    }

    async fn recompute_usage(&self, principal_id: &str) -> StorageResult<QuotaRecord> {
        let _guard = self.write_lock.lock().await;
        let mut entry = self.load_entry(principal_id).await?;
        let used: u64 = self
            .all_files()
            .await?
            .iter()
            .filter(|f| f.owner_id == principal_id && f.kind == FileKind::File)
            .map(|f| f.size)
            .sum();
        entry.principal.quota.used_storage = used;
        self.save_entry(&entry).await?;
        Ok(entry.principal.quota)
    }

    async fn insert_folder(&self, folder: NewFile) -> StorageResult<FileMetadata> {
        let _guard = self.write_lock.lock().await;
        let record = NewFile {
            kind: FileKind::Folder,
            size: 0,
            ..folder
        }
        .into_metadata();
        if self
            .by_provider_object(&record.provider_object_id)
            .await?
            .is_some()
        {
            return Err(StorageError::Conflict(format!(
                "Provider object {} is already indexed",
                record.provider_object_id
            )));
        }
        Records::save_atomic(&self.file_path(&record.id), &record).await?;
        Ok(record)
    }

    async fn find_file(&self, id: &str) -> StorageResult<Option<FileMetadata>> {
        if !is_safe_id(id) {
            return Ok(None);
        }
        Ok(Records::load(&self.file_path(id)).await?)
    }

    async fn find_by_provider_object(
        &self,
        provider_object_id: &str,
    ) -> StorageResult<Option<FileMetadata>> {
        self.by_provider_object(provider_object_id).await
    }

    async fn list_children(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StorageResult<Vec<FileMetadata>> {
        let mut children: Vec<FileMetadata> = self
            .all_files()
            .await?
            .into_iter()
            .filter(|f| f.owner_id == owner_id && f.parent_id.as_deref() == parent_id)
            .collect();
        children.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(children)
    }

    async fn delete_file(&self, id: &str) -> StorageResult<Option<FileMetadata>> {
        if !is_safe_id(id) {
            return Ok(None);
        }
        let _guard = self.write_lock.lock().await;
        let path = self.file_path(id);
        let record: Option<FileMetadata> = Records::load(&path).await?;
        if record.is_some() {
            Records::remove(&path).await?;
        }
        Ok(record)
    }
}
