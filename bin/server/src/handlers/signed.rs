//! Signed, time-limited links for unauthenticated file access

use crate::auth::AuthenticatedPrincipal;
use crate::constants::MAX_SIGNED_URL_TTL_MINUTES;
use crate::handlers::error::{handle_auth_error, ServiceError};
use crate::state::AppState;
use actix_web::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use actix_web::{get, post, web, HttpResponse, Result as ActixResult};
use common::file_utils::content_disposition;
use common::{SignedAccessQuery, SignedUrlRequest, SignedUrlResponse};
use storage::FileMetadata;
use tracing::info;

/// Issue a grant for one of the caller's files
#[post("/files/{id}/signed-url")]
pub async fn signed_url(
    principal: AuthenticatedPrincipal,
    path: web::Path<String>,
    req: Option<web::Json<SignedUrlRequest>>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let file_id = path.into_inner();
    let ttl_minutes = req
        .and_then(|r| r.ttl_minutes)
        .unwrap_or(state.links.default_ttl_minutes);
    if ttl_minutes == 0 || ttl_minutes > MAX_SIGNED_URL_TTL_MINUTES {
        return Err(ServiceError::BadRequest(format!(
            "ttlMinutes must be between 1 and {}",
            MAX_SIGNED_URL_TTL_MINUTES
        ))
        .into());
    }

    let record = state
        .storage
        .find_file(&file_id)
        .await
        .map_err(ServiceError::from)?
        .filter(|f| f.owner_id == principal.id() && !f.is_folder())
        .ok_or_else(|| ServiceError::NotFound(format!("File {} not found", file_id)))?;

    let grant = state.signer.generate(&record.id, principal.id(), ttl_minutes);
    let query = format!(
        "userId={}&expires={}&signature={}",
        grant.principal_id, grant.expires, grant.signature
    );
    let base = format!("{}/files/{}", state.links.public_base_url, record.id);

    info!(principal = %principal.id(), file_id = %record.id, ttl_minutes, "Signed link issued");
    Ok(HttpResponse::Ok().json(SignedUrlResponse {
        user_id: grant.principal_id.clone(),
        expires: grant.expires,
        signature: grant.signature.clone(),
        view_url: format!("{}/signed-view?{}", base, query),
        download_url: format!("{}/signed-download?{}", base, query),
    }))
}

#[get("/files/{id}/signed-view")]
pub async fn signed_view(
    path: web::Path<String>,
    query: web::Query<SignedAccessQuery>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    serve_signed(&state, &path.into_inner(), &query, "inline").await
}

#[get("/files/{id}/signed-download")]
pub async fn signed_download(
    path: web::Path<String>,
    query: web::Query<SignedAccessQuery>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    serve_signed(&state, &path.into_inner(), &query, "attachment").await
}

/// Validate the grant, then stream the object from the provider
async fn serve_signed(
    state: &AppState,
    file_id: &str,
    query: &SignedAccessQuery,
    disposition: &str,
) -> ActixResult<HttpResponse> {
    state
        .signer
        .verify(file_id, &query.user_id, query.expires, &query.signature)
        .map_err(|e| handle_auth_error("Signed link rejected", e))?;

    let record = owned_record(state, file_id, &query.user_id).await?;
    let bytes = state
        .gateway()?
        .download_object(&record.provider_object_id)
        .await
        .map_err(ServiceError::from)?;

    info!(file_id = %record.id, disposition, "Serving signed file");
    Ok(HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, record.mime_type.clone()))
        .insert_header((
            CONTENT_DISPOSITION,
            content_disposition(disposition, &record.original_name),
        ))
        .body(bytes))
}

async fn owned_record(
    state: &AppState,
    file_id: &str,
    user_id: &str,
) -> Result<FileMetadata, ServiceError> {
    let record = state
        .storage
        .find_file(file_id)
        .await?
        .filter(|f| !f.is_folder())
        .ok_or_else(|| ServiceError::NotFound(format!("File {} not found", file_id)))?;
    if record.owner_id != user_id {
        return Err(ServiceError::InvalidSignedGrant(
            "Signed link does not belong to the file owner".into(),
        ));
    }
    Ok(record)
}
