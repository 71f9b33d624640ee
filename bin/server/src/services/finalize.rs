use crate::handlers::error::{handle_error, ServiceError};
use crate::services::containers;
use common::file_utils::validate_filename;
use common::CompleteUploadRequest;
use drive::RemoteStorageGateway;
use storage::{CommitOutcome, FileKind, NewFile, Storage, StorageError};
use tracing::{info, warn};

/// Indexes a provider-confirmed object and charges its size.
///
/// The remote object and the metadata index are separate systems, so the
/// object is verified first and the record plus quota charge are committed
/// in one atomic store operation afterwards. Only objects stored inside one
/// of the principal's containers can be claimed.
pub struct UploadFinalizer<'a> {
    storage: &'a dyn Storage,
    gateway: &'a dyn RemoteStorageGateway,
}

impl<'a> UploadFinalizer<'a> {
    pub fn new(storage: &'a dyn Storage, gateway: &'a dyn RemoteStorageGateway) -> Self {
        Self { storage, gateway }
    }

    pub async fn finalize(
        &self,
        principal_id: &str,
        req: &CompleteUploadRequest,
    ) -> Result<CommitOutcome, ServiceError> {
        let object_id = req.drive_file_id.trim();
        if object_id.is_empty() {
            return Err(ServiceError::BadRequest("Missing driveFileId".into()));
        }
        validate_filename(&req.original_name).map_err(|e| handle_error("Invalid file name", e))?;

        if let Some(parent_id) = &req.parent_id {
            containers::owned_folder(self.storage, principal_id, parent_id).await?;
        }

        let not_found =
            || ServiceError::NotFound(format!("File {} not found in storage provider", object_id));

        // A client cannot claim completion for an object the provider does not have
        let remote = self.gateway.get_object(object_id).await.map_err(|e| {
            if e.is_not_found() {
                not_found()
            } else {
                e.into()
            }
        })?;

        // Nor for one stored outside its own containers
        let principal = self.storage.load_principal(principal_id).await?;
        if !containers::holds_object(self.storage, &principal, &remote.parents).await? {
            warn!(
                principal = %principal_id,
                object_id = %object_id,
                "Completion claimed for an object outside the principal's containers"
            );
            return Err(not_found());
        }

        let size = match remote.size {
            Some(actual) if actual != req.size => {
                warn!(
                    principal = %principal_id,
                    object_id = %object_id,
                    declared = req.size,
                    actual,
                    "Declared size differs from stored object, charging stored size"
                );
                actual
            }
            Some(actual) => actual,
            None => req.size,
        };

        let file = NewFile {
            provider_object_id: object_id.to_string(),
            owner_id: principal_id.to_string(),
            original_name: req.original_name.clone(),
            storage_key: req.file_name.clone(),
            size,
            mime_type: req.mime_type.clone(),
            kind: FileKind::File,
            thumbnail_ref: None,
            preview_ref: None,
            parent_id: req.parent_id.clone(),
        };

        match self.storage.commit_upload(file).await {
            Ok(CommitOutcome::Created(record)) => {
                info!(
                    principal = %principal_id,
                    file_id = %record.id,
                    object_id = %object_id,
                    size,
                    "Upload finalized"
                );
                Ok(CommitOutcome::Created(record))
            }
            Ok(CommitOutcome::Existing(record)) => {
                info!(
                    principal = %principal_id,
                    file_id = %record.id,
                    object_id = %object_id,
                    "Upload already finalized"
                );
                Ok(CommitOutcome::Existing(record))
            }
            Err(err @ StorageError::QuotaExceeded { .. }) => {
                // The object sits in the principal's own container; do not leak it
                if let Err(e) = self.gateway.delete_object(object_id).await {
                    warn!(object_id = %object_id, "Failed to delete rejected upload: {}", e);
                }
                Err(err.into())
            }
            // Indexed for another principal
            Err(StorageError::Conflict(_)) => Err(not_found()),
            Err(err) => Err(err.into()),
        }
    }
}
