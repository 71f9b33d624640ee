//! A server stand-in wired to the in-memory provider

use crate::api::{ApiError, UploadApi};
use async_trait::async_trait;
use common::{CompleteUploadRequest, FileRecord, UploadSessionRequest, UploadSessionResponse};
use drive::{MemoryDrive, RemoteStorageGateway, SessionTarget};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeApi {
    pub drive: MemoryDrive,
    pub sessions: Mutex<Vec<UploadSessionRequest>>,
    pub completions: Mutex<Vec<CompleteUploadRequest>>,
    session_failures: Mutex<VecDeque<ApiError>>,
}

impl FakeApi {
    pub fn new(drive: MemoryDrive) -> Self {
        Self {
            drive,
            ..Default::default()
        }
    }

    /// Fail the next session request
    pub fn fail_next_session(&self, err: ApiError) {
        self.session_failures.lock().unwrap().push_back(err);
    }

    pub fn session_requests(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn completed(&self) -> Vec<CompleteUploadRequest> {
        self.completions.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadApi for FakeApi {
    async fn open_session(
        &self,
        req: &UploadSessionRequest,
    ) -> Result<UploadSessionResponse, ApiError> {
        self.sessions.lock().unwrap().push(req.clone());
        if let Some(err) = self.session_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let unique_file_name = format!("key-{}", req.file_name);
        let session_url = self
            .drive
            .open_resumable_session(&SessionTarget {
                name: unique_file_name.clone(),
                parent_folder: "root".into(),
                mime_type: req.mime_type.clone(),
                size: req.size,
            })
            .await
            .map_err(|e| ApiError::Status {
                status: 400,
                message: e.to_string(),
            })?;
        Ok(UploadSessionResponse {
            session_url,
            unique_file_name,
        })
    }

    async fn complete_upload(&self, req: &CompleteUploadRequest) -> Result<FileRecord, ApiError> {
        if !self.drive.contains_object(&req.drive_file_id) {
            return Err(ApiError::Status {
                status: 404,
                message: format!("File {} not found in storage provider", req.drive_file_id),
            });
        }
        self.completions.lock().unwrap().push(req.clone());
        Ok(FileRecord {
            id: format!("rec-{}", req.drive_file_id),
            drive_file_id: req.drive_file_id.clone(),
            owner_id: "alice".into(),
            original_name: req.original_name.clone(),
            storage_key: req.file_name.clone(),
            size: req.size,
            mime_type: req.mime_type.clone(),
            is_folder: false,
            parent_id: req.parent_id.clone(),
            created_at: 0,
        })
    }
}

/// Deterministic payload of `len` bytes
pub fn payload(len: usize) -> bytes::Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}
