pub mod file_utils;
pub mod utils;

use serde::{Deserialize, Serialize};

pub use utils::get_current_timestamp_ms;

/// Body of `POST /files/upload/session`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionRequest {
    pub file_name: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Resumable session handed back to the client. `session_url` is provider-hosted
/// and is used directly for chunk transfer; `unique_file_name` is the storage key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionResponse {
    pub session_url: String,
    pub unique_file_name: String,
}

/// Body of `POST /files/upload/complete`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub drive_file_id: String,
    pub original_name: String,
    pub file_name: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Metadata record as exposed over HTTP
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub drive_file_id: String,
    pub owner_id: String,
    pub original_name: String,
    pub storage_key: String,
    pub size: u64,
    pub mime_type: String,
    pub is_folder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub created_at: u64,
}

/// Body of `POST /folders`
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Query of `GET /files`
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesQuery {
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Body of `POST /files/{id}/signed-url`
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlRequest {
    #[serde(default)]
    pub ttl_minutes: Option<u64>,
}

/// Issued signed grant plus ready-to-use links
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlResponse {
    pub user_id: String,
    pub expires: u64,
    pub signature: String,
    pub view_url: String,
    pub download_url: String,
}

/// Query parameters carried by signed links
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignedAccessQuery {
    pub user_id: String,
    pub expires: u64,
    pub signature: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    pub max_storage: u64,
    pub used_storage: u64,
}

/// Error body returned by every failing endpoint
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response from health check endpoint
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String, // "ok" when healthy
}
