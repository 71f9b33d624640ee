//! Records kept by the metadata index and the quota ledger

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// Used vs. allotted bytes for one principal.
/// `used_storage <= max_storage` holds after every committed allocation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaRecord {
    pub max_storage: u64,
    pub used_storage: u64,
}

impl QuotaRecord {
    pub fn new(max_storage: u64) -> Self {
        Self {
            max_storage,
            used_storage: 0,
        }
    }

    pub fn available(&self) -> u64 {
        self.max_storage.saturating_sub(self.used_storage)
    }

    /// Reject, never clamp, an allocation that would overrun the limit
    pub fn check_allocation(&self, size: u64) -> StorageResult<()> {
        match self.used_storage.checked_add(size) {
            Some(total) if total <= self.max_storage => Ok(()),
            _ => Err(StorageError::QuotaExceeded {
                requested: size,
                used: self.used_storage,
                max: self.max_storage,
            }),
        }
    }

    pub fn allocate(&self, size: u64) -> StorageResult<QuotaRecord> {
        self.check_allocation(size)?;
        Ok(QuotaRecord {
            used_storage: self.used_storage + size,
            ..*self
        })
    }

    /// Credits floor at zero to tolerate drift
    pub fn release(&self, size: u64) -> QuotaRecord {
        QuotaRecord {
            used_storage: self.used_storage.saturating_sub(size),
            ..*self
        }
    }
}

/// A user or actor owning files and quota
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub quota: QuotaRecord,
    /// Provider folder id of the principal's root container, created lazily
    pub root_container_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Folder,
}

/// Durable index entry for a provider object.
/// `size` never changes after creation; only `parent_id` may.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileMetadata {
    pub id: String,
    pub provider_object_id: String,
    pub owner_id: String,
    pub original_name: String,
    pub storage_key: String,
    pub size: u64,
    pub mime_type: String,
    pub kind: FileKind,
    pub thumbnail_ref: Option<String>,
    pub preview_ref: Option<String>,
    pub parent_id: Option<String>,
    pub created_at: u64,
}

impl FileMetadata {
    pub fn is_folder(&self) -> bool {
        self.kind == FileKind::Folder
    }

    pub fn to_record(&self) -> common::FileRecord {
        common::FileRecord {
            id: self.id.clone(),
            drive_file_id: self.provider_object_id.clone(),
            owner_id: self.owner_id.clone(),
            original_name: self.original_name.clone(),
            storage_key: self.storage_key.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
            is_folder: self.is_folder(),
            parent_id: self.parent_id.clone(),
            created_at: self.created_at,
        }
    }
}

/// Everything needed to index a new record; the store assigns id and timestamp
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFile {
    pub provider_object_id: String,
    pub owner_id: String,
    pub original_name: String,
    pub storage_key: String,
    pub size: u64,
    pub mime_type: String,
    pub kind: FileKind,
    pub thumbnail_ref: Option<String>,
    pub preview_ref: Option<String>,
    pub parent_id: Option<String>,
}

impl NewFile {
    pub fn into_metadata(self) -> FileMetadata {
        FileMetadata {
            id: uuid::Uuid::new_v4().to_string(),
            provider_object_id: self.provider_object_id,
            owner_id: self.owner_id,
            original_name: self.original_name,
            storage_key: self.storage_key,
            size: self.size,
            mime_type: self.mime_type,
            kind: self.kind,
            thumbnail_ref: self.thumbnail_ref,
            preview_ref: self.preview_ref,
            parent_id: self.parent_id,
            created_at: common::get_current_timestamp_ms(),
        }
    }
}

/// Result of committing an upload to the index and the ledger
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// New record written and quota charged
    Created(FileMetadata),
    /// The provider object was already indexed; nothing was charged
    Existing(FileMetadata),
}

impl CommitOutcome {
    /// An already indexed object, reusable only by the owner it was indexed for
    pub fn existing(record: FileMetadata, owner_id: &str) -> StorageResult<Self> {
        if record.owner_id != owner_id {
            return Err(StorageError::Conflict(format!(
                "Provider object {} belongs to another principal",
                record.provider_object_id
            )));
        }
        Ok(CommitOutcome::Existing(record))
    }

    pub fn record(&self) -> &FileMetadata {
        match self {
            CommitOutcome::Created(record) | CommitOutcome::Existing(record) => record,
        }
    }

    pub fn into_record(self) -> FileMetadata {
        match self {
            CommitOutcome::Created(record) | CommitOutcome::Existing(record) => record,
        }
    }
}
