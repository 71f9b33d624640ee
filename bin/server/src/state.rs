//! Server application state management

use crate::handlers::error::ServiceError;
use crypto::SignatureService;
use drive::RemoteStorageGateway;
use std::sync::Arc;
use storage::Storage;

/// How signed links are issued
#[derive(Debug, Clone)]
pub struct SignedLinkSettings {
    pub public_base_url: String,
    pub default_ttl_minutes: u64,
}

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    /// `None` when no provider credentials are configured
    pub gateway: Option<Arc<dyn RemoteStorageGateway>>,
    pub signer: SignatureService,
    pub links: SignedLinkSettings,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        gateway: Option<Arc<dyn RemoteStorageGateway>>,
        signer: SignatureService,
        links: SignedLinkSettings,
    ) -> Self {
        Self {
            storage,
            gateway,
            signer,
            links,
        }
    }

    pub fn gateway(&self) -> Result<&dyn RemoteStorageGateway, ServiceError> {
        self.gateway.as_deref().ok_or_else(|| {
            ServiceError::BackendUnavailable("storage provider is not configured".to_string())
        })
    }
}
