use crate::auth::AuthenticatedPrincipal;
use crate::services::{UploadFinalizer, UploadSessionCoordinator};
use crate::state::AppState;
use actix_web::{post, web, HttpResponse, Result as ActixResult};
use common::{CompleteUploadRequest, UploadSessionRequest};
use storage::CommitOutcome;
use tracing::info;

/// Open a resumable upload session at the storage provider
#[post("/files/upload/session")]
pub async fn create_session(
    principal: AuthenticatedPrincipal,
    req: web::Json<UploadSessionRequest>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        principal = %principal.id(),
        file_name = ?req.file_name,
        size = req.size,
        "POST /files/upload/session - Request received"
    );

    let gateway = state.gateway()?;
    let session = UploadSessionCoordinator::new(state.storage.as_ref(), gateway)
        .open_session(principal.id(), &req)
        .await?;

    Ok(HttpResponse::Ok().json(session))
}

/// Index an upload the provider reported as complete
#[post("/files/upload/complete")]
pub async fn complete_upload(
    principal: AuthenticatedPrincipal,
    req: web::Json<CompleteUploadRequest>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        principal = %principal.id(),
        object_id = %req.drive_file_id,
        original_name = ?req.original_name,
        "POST /files/upload/complete - Request received"
    );

    let gateway = state.gateway()?;
    let outcome = UploadFinalizer::new(state.storage.as_ref(), gateway)
        .finalize(principal.id(), &req)
        .await?;

    Ok(match outcome {
        CommitOutcome::Created(record) => HttpResponse::Created().json(record.to_record()),
        CommitOutcome::Existing(record) => HttpResponse::Ok().json(record.to_record()),
    })
}
