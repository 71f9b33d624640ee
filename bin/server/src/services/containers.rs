use crate::constants::root_container_name;
use crate::handlers::error::ServiceError;
use drive::RemoteStorageGateway;
use storage::{FileMetadata, Principal, Storage};
use tracing::{info, warn};

/// A container record owned by `principal_id`; anything else is reported as
/// not found so foreign ids are indistinguishable from missing ones
pub async fn owned_folder(
    storage: &dyn Storage,
    principal_id: &str,
    folder_id: &str,
) -> Result<FileMetadata, ServiceError> {
    match storage.find_file(folder_id).await? {
        Some(folder) if folder.owner_id == principal_id && folder.is_folder() => Ok(folder),
        _ => Err(ServiceError::NotFound(format!(
            "Parent folder {} not found",
            folder_id
        ))),
    }
}

/// Whether any of `parents` is the principal's root container or a folder it owns
pub async fn holds_object(
    storage: &dyn Storage,
    principal: &Principal,
    parents: &[String],
) -> Result<bool, ServiceError> {
    for parent in parents {
        if principal.root_container_id.as_deref() == Some(parent.as_str()) {
            return Ok(true);
        }
        if let Some(folder) = storage.find_by_provider_object(parent).await? {
            if folder.owner_id == principal.id && folder.is_folder() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Provider folder id of the principal's root container, created on first use
pub async fn root_container(
    storage: &dyn Storage,
    gateway: &dyn RemoteStorageGateway,
    principal: &Principal,
) -> Result<String, ServiceError> {
    if let Some(root) = &principal.root_container_id {
        return Ok(root.clone());
    }

    let created = gateway
        .create_folder(&root_container_name(&principal.id), None)
        .await?;
    let root = storage.set_root_container(&principal.id, &created).await?;
    if root != created {
        // A concurrent request recorded its root first
        if let Err(e) = gateway.delete_object(&created).await {
            warn!(principal = %principal.id, folder = %created, "Failed to delete spare root: {}", e);
        }
        return Ok(root);
    }
    info!(principal = %principal.id, root = %root, "Created root container");
    Ok(root)
}

/// Provider folder id an upload or new folder lands in
pub async fn destination(
    storage: &dyn Storage,
    gateway: &dyn RemoteStorageGateway,
    principal: &Principal,
    parent: Option<&FileMetadata>,
) -> Result<String, ServiceError> {
    match parent {
        Some(folder) => Ok(folder.provider_object_id.clone()),
        None => root_container(storage, gateway, principal).await,
    }
}
