use crate::error::GatewayError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Mime type the provider uses to mark folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Where and what a resumable session will create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub name: String,
    pub parent_folder: String,
    pub mime_type: String,
    pub size: u64,
}

/// Provider-side view of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Folders and some native documents carry no size
    pub size: Option<u64>,
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: String,
    pub role: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPermission {
    pub role: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

/// Narrow capability interface over the third-party object store.
///
/// Chunk transfer is not part of it: clients talk to the session URL
/// directly through a [`crate::ResumableTransport`].
#[async_trait]
pub trait RemoteStorageGateway: Send + Sync {
    /// Create a folder under `parent` (provider root when `None`), returning its id
    async fn create_folder(&self, name: &str, parent: Option<&str>)
        -> Result<String, GatewayError>;

    /// Open a resumable upload session and return its session URL
    async fn open_resumable_session(&self, target: &SessionTarget) -> Result<String, GatewayError>;

    /// Metadata of an existing object; `NotFound` if it does not exist
    async fn get_object(&self, object_id: &str) -> Result<RemoteObject, GatewayError>;

    async fn download_object(&self, object_id: &str) -> Result<Bytes, GatewayError>;

    async fn delete_object(&self, object_id: &str) -> Result<(), GatewayError>;

    async fn move_object(
        &self,
        object_id: &str,
        new_parent: &str,
        old_parent: &str,
    ) -> Result<(), GatewayError>;

    async fn list_permissions(&self, object_id: &str) -> Result<Vec<Permission>, GatewayError>;

    async fn create_permission(
        &self,
        object_id: &str,
        permission: &NewPermission,
    ) -> Result<Permission, GatewayError>;

    async fn delete_permission(
        &self,
        object_id: &str,
        permission_id: &str,
    ) -> Result<(), GatewayError>;
}
