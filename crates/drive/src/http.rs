//! Drive-v3 style HTTP gateway with OAuth access-token lifecycle

use crate::error::GatewayError;
use crate::gateway::{
    NewPermission, Permission, RemoteObject, RemoteStorageGateway, SessionTarget,
    FOLDER_MIME_TYPE,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::LOCATION;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "https://www.googleapis.com";
pub const DEFAULT_UPLOAD_URL: &str = "https://www.googleapis.com/upload";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the provider-declared expiry
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

const OBJECT_FIELDS: &str = "id,name,mimeType,size,parents";

/// How the gateway obtains access tokens
#[derive(Clone, Debug)]
pub enum DriveCredentials {
    /// Pre-issued token, used as-is
    AccessToken(String),
    /// OAuth refresh-token flow
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_url: String,
    },
}

#[derive(Clone, Debug)]
pub struct DriveConfig {
    pub api_url: String,
    pub upload_url: String,
    pub credentials: DriveCredentials,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    /// The provider encodes int64 sizes as strings
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
}

impl DriveFile {
    fn into_remote(self) -> Result<RemoteObject, GatewayError> {
        let size = match self.size {
            Some(raw) => Some(
                raw.parse::<u64>()
                    .map_err(|_| GatewayError::Decode(format!("Invalid object size: {}", raw)))?,
            ),
            None => None,
        };
        Ok(RemoteObject {
            id: self.id,
            name: self.name,
            mime_type: self.mime_type,
            size,
            parents: self.parents,
        })
    }
}

#[derive(Deserialize)]
struct PermissionList {
    #[serde(default)]
    permissions: Vec<Permission>,
}

pub struct HttpDriveGateway {
    client: reqwest::Client,
    config: DriveConfig,
    token: Mutex<Option<CachedToken>>,
}

impl HttpDriveGateway {
    pub fn new(config: DriveConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.config.api_url.trim_end_matches('/'))
    }

    fn object_url(&self, object_id: &str) -> String {
        format!("{}/{}", self.files_url(), object_id)
    }

    /// Current access token, refreshed when missing or about to expire
    async fn access_token(&self) -> Result<String, GatewayError> {
        let (client_id, client_secret, refresh_token, token_url) = match &self.config.credentials
        {
            DriveCredentials::AccessToken(token) => return Ok(token.clone()),
            DriveCredentials::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
                token_url,
            } => (client_id, client_secret, refresh_token, token_url),
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Refreshing storage provider access token");
        let response = self
            .client
            .post(token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Token refresh failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable(format!(
                "Token refresh rejected ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        info!("Storage provider access token refreshed");
        Ok(token.access_token)
    }

    async fn send(&self, request: RequestBuilder, object_id: &str) -> Result<Response, GatewayError> {
        let token = self.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(object_id.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RemoteStorageGateway for HttpDriveGateway {
    async fn create_folder(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, GatewayError> {
        let mut metadata = json!({ "name": name, "mimeType": FOLDER_MIME_TYPE });
        if let Some(parent) = parent {
            metadata["parents"] = json!([parent]);
        }
        let request = self
            .client
            .post(self.files_url())
            .query(&[("fields", "id")])
            .json(&metadata);
        let folder: DriveFile = self.send(request, parent.unwrap_or("root")).await?.json().await?;
        Ok(folder.id)
    }

    async fn open_resumable_session(&self, target: &SessionTarget) -> Result<String, GatewayError> {
        let url = format!(
            "{}/drive/v3/files",
            self.config.upload_url.trim_end_matches('/')
        );
        let request = self
            .client
            .post(url)
            .query(&[("uploadType", "resumable"), ("fields", OBJECT_FIELDS)])
            .header("X-Upload-Content-Type", target.mime_type.as_str())
            .header("X-Upload-Content-Length", target.size)
            .json(&json!({
                "name": target.name,
                "parents": [target.parent_folder],
            }));
        let response = self.send(request, &target.parent_folder).await?;
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| GatewayError::Decode("Session response has no Location header".into()))
    }

    async fn get_object(&self, object_id: &str) -> Result<RemoteObject, GatewayError> {
        let request = self
            .client
            .get(self.object_url(object_id))
            .query(&[("fields", OBJECT_FIELDS)]);
        let file: DriveFile = self.send(request, object_id).await?.json().await?;
        file.into_remote()
    }

    async fn download_object(&self, object_id: &str) -> Result<Bytes, GatewayError> {
        let request = self
            .client
            .get(self.object_url(object_id))
            .query(&[("alt", "media")]);
        Ok(self.send(request, object_id).await?.bytes().await?)
    }

    async fn delete_object(&self, object_id: &str) -> Result<(), GatewayError> {
        let request = self.client.delete(self.object_url(object_id));
        self.send(request, object_id).await?;
        Ok(())
    }

    async fn move_object(
        &self,
        object_id: &str,
        new_parent: &str,
        old_parent: &str,
    ) -> Result<(), GatewayError> {
        let request = self
            .client
            .patch(self.object_url(object_id))
            .query(&[
                ("addParents", new_parent),
                ("removeParents", old_parent),
                ("fields", "id"),
            ])
            .json(&json!({}));
        self.send(request, object_id).await?;
        Ok(())
    }

    async fn list_permissions(&self, object_id: &str) -> Result<Vec<Permission>, GatewayError> {
        let request = self
            .client
            .get(format!("{}/permissions", self.object_url(object_id)))
            .query(&[("fields", "permissions(id,role,type,emailAddress)")]);
        let list: PermissionList = self.send(request, object_id).await?.json().await?;
        Ok(list.permissions)
    }

    async fn create_permission(
        &self,
        object_id: &str,
        permission: &NewPermission,
    ) -> Result<Permission, GatewayError> {
        let request = self
            .client
            .post(format!("{}/permissions", self.object_url(object_id)))
            .query(&[("fields", "id,role,type,emailAddress")])
            .json(permission);
        Ok(self.send(request, object_id).await?.json().await?)
    }

    async fn delete_permission(
        &self,
        object_id: &str,
        permission_id: &str,
    ) -> Result<(), GatewayError> {
        let request = self.client.delete(format!(
            "{}/permissions/{}",
            self.object_url(object_id),
            permission_id
        ));
        self.send(request, object_id).await?;
        Ok(())
    }
}
