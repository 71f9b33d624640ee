use crate::constants::FALLBACK_MIME_TYPE;
use crate::handlers::error::{handle_error, ServiceError};
use crate::services::containers;
use common::file_utils::{unique_storage_key, validate_filename};
use common::{UploadSessionRequest, UploadSessionResponse};
use drive::{RemoteStorageGateway, SessionTarget};
use storage::Storage;
use tracing::info;

/// Negotiates resumable upload sessions.
///
/// Writes no metadata and reserves no quota: both happen at finalization,
/// so an abandoned session leaves nothing behind but the provider session.
pub struct UploadSessionCoordinator<'a> {
    storage: &'a dyn Storage,
    gateway: &'a dyn RemoteStorageGateway,
}

impl<'a> UploadSessionCoordinator<'a> {
    pub fn new(storage: &'a dyn Storage, gateway: &'a dyn RemoteStorageGateway) -> Self {
        Self { storage, gateway }
    }

    pub async fn open_session(
        &self,
        principal_id: &str,
        req: &UploadSessionRequest,
    ) -> Result<UploadSessionResponse, ServiceError> {
        if req.size == 0 {
            return Err(ServiceError::BadRequest("File size must be greater than zero".into()));
        }
        validate_filename(&req.file_name).map_err(|e| handle_error("Invalid file name", e))?;

        // Preflight only; the authoritative check happens at commit
        let principal = self.storage.load_principal(principal_id).await?;
        principal.quota.check_allocation(req.size)?;

        let parent = match &req.parent_id {
            Some(parent_id) => {
                Some(containers::owned_folder(self.storage, principal_id, parent_id).await?)
            }
            None => None,
        };
        let folder =
            containers::destination(self.storage, self.gateway, &principal, parent.as_ref())
                .await?;

        let storage_key = unique_storage_key(&req.file_name);
        let mime_type = if req.mime_type.trim().is_empty() {
            FALLBACK_MIME_TYPE.to_string()
        } else {
            req.mime_type.clone()
        };

        let session_url = self
            .gateway
            .open_resumable_session(&SessionTarget {
                name: storage_key.clone(),
                parent_folder: folder,
                mime_type,
                size: req.size,
            })
            .await?;

        info!(
            principal = %principal_id,
            file_name = ?req.file_name,
            storage_key = %storage_key,
            size = req.size,
            "Upload session opened"
        );

        Ok(UploadSessionResponse {
            session_url,
            unique_file_name: storage_key,
        })
    }
}
