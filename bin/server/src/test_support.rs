//! Shared fixtures: filesystem store in a temp dir plus an in-memory provider

use crate::services::containers;
use crate::state::{AppState, SignedLinkSettings};
use actix_web::web;
use crypto::SignatureService;
use drive::{MemoryDrive, RemoteStorageGateway};
use std::sync::Arc;
use storage::filesystem::FilesystemStorage;
use storage::{FileKind, NewFile, Storage};

pub const TEST_SECRET: &str = "test-signing-secret";
pub const TEST_BASE_URL: &str = "http://files.test";

pub struct TestContext {
    _dir: tempfile::TempDir,
    pub storage: Arc<dyn Storage>,
    pub drive: MemoryDrive,
}

impl TestContext {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::open(dir.path()).await.unwrap();
        Self {
            _dir: dir,
            storage: Arc::new(storage),
            drive: MemoryDrive::new(),
        }
    }

    /// Provision a principal and return its bearer token
    pub async fn add_principal(&self, id: &str, max_storage: u64) -> String {
        let token = crypto::generate_token();
        self.storage
            .create_principal(id, &crypto::hash_token(&token), max_storage)
            .await
            .unwrap();
        token
    }

    /// Place an object in the owner's root container, creating the root if needed
    pub async fn stored_object(&self, owner: &str, name: &str, data: Vec<u8>) -> String {
        let principal = self.storage.load_principal(owner).await.unwrap();
        let root = containers::root_container(self.storage.as_ref(), &self.drive, &principal)
            .await
            .unwrap();
        self.drive
            .insert_object_in(&root, name, "application/octet-stream", data)
    }

    pub fn new_file(&self, owner: &str, provider_object_id: &str, size: u64) -> NewFile {
        NewFile {
            provider_object_id: provider_object_id.to_string(),
            owner_id: owner.to_string(),
            original_name: format!("{}.txt", provider_object_id),
            storage_key: format!("{}.txt", provider_object_id),
            size,
            mime_type: "text/plain".to_string(),
            kind: FileKind::File,
            thumbnail_ref: None,
            preview_ref: None,
            parent_id: None,
        }
    }

    pub fn state(&self) -> web::Data<AppState> {
        let gateway: Arc<dyn RemoteStorageGateway> = Arc::new(self.drive.clone());
        web::Data::new(AppState::new(
            self.storage.clone(),
            Some(gateway),
            SignatureService::new(TEST_SECRET),
            SignedLinkSettings {
                public_base_url: TEST_BASE_URL.to_string(),
                default_ttl_minutes: 5,
            },
        ))
    }

    pub fn state_without_provider(&self) -> web::Data<AppState> {
        web::Data::new(AppState::new(
            self.storage.clone(),
            None,
            SignatureService::new(TEST_SECRET),
            SignedLinkSettings {
                public_base_url: TEST_BASE_URL.to_string(),
                default_ttl_minutes: 5,
            },
        ))
    }
}
