//! Calls to the storage server

use crate::constants::{COMPLETE_ENDPOINT, SESSION_ENDPOINT, SIGNED_URL_SUFFIX};
use async_trait::async_trait;
use common::{
    CompleteUploadRequest, ErrorResponse, FileRecord, SignedUrlRequest, SignedUrlResponse,
    UploadSessionRequest, UploadSessionResponse,
};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// No response at all, or a 5xx
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::Decode(_) => false,
        }
    }
}

/// The two server calls an upload needs
#[async_trait]
pub trait UploadApi: Send + Sync {
    async fn open_session(
        &self,
        req: &UploadSessionRequest,
    ) -> Result<UploadSessionResponse, ApiError>;

    async fn complete_upload(&self, req: &CompleteUploadRequest) -> Result<FileRecord, ApiError>;
}

pub struct ServerApi {
    client: Client,
    server: String,
    token: String,
}

impl ServerApi {
    pub fn new(server: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            server: server.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Request signed view/download links for a finalized file
    pub async fn signed_url(
        &self,
        file_id: &str,
        ttl_minutes: Option<u64>,
    ) -> Result<SignedUrlResponse, ApiError> {
        let url = format!("{}/files/{}{}", self.server, file_id, SIGNED_URL_SUFFIX);
        self.send(self.client.post(url).json(&SignedUrlRequest { ttl_minutes }))
            .await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl UploadApi for ServerApi {
    async fn open_session(
        &self,
        req: &UploadSessionRequest,
    ) -> Result<UploadSessionResponse, ApiError> {
        let url = format!("{}{}", self.server, SESSION_ENDPOINT);
        self.send(self.client.post(url).json(req)).await
    }

    async fn complete_upload(&self, req: &CompleteUploadRequest) -> Result<FileRecord, ApiError> {
        let url = format!("{}{}", self.server, COMPLETE_ENDPOINT);
        self.send(self.client.post(url).json(req)).await
    }
}
