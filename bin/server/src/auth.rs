use crate::handlers::error::{handle_auth_error, ServiceError};
use crate::state::AppState;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Principal resolved from the request's bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPrincipal(pub String);

impl AuthenticatedPrincipal {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Handles bearer-token authentication
pub struct AuthVerifier;

impl AuthVerifier {
    /// Extract the token from `Authorization: Bearer <token>`
    pub fn bearer_token(req: &HttpRequest) -> Result<String, ServiceError> {
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .ok_or_else(|| ServiceError::Unauthorized("Missing Authorization header".into()))?;
        let value = header
            .to_str()
            .map_err(|e| handle_auth_error("Invalid Authorization header", e))?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("Expected a bearer token".into()))?;
        Ok(token.to_string())
    }

    pub async fn authenticate(state: &AppState, token: &str) -> Result<String, ServiceError> {
        let principal = state
            .storage
            .principal_for_token(&crypto::hash_token(token))
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("Unknown token".into()))?;
        debug!(principal = %principal, "Request authenticated");
        Ok(principal)
    }
}

impl FromRequest for AuthenticatedPrincipal {
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = AuthVerifier::bearer_token(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();
        Box::pin(async move {
            let token = token?;
            let state = state.ok_or_else(|| {
                ServiceError::Internal("Application state not configured".into())
            })?;
            let principal = AuthVerifier::authenticate(&state, &token).await?;
            Ok(AuthenticatedPrincipal(principal))
        })
    }
}
