use crate::auth::AuthenticatedPrincipal;
use crate::handlers::error::ServiceError;
use crate::services::containers;
use crate::state::AppState;
use actix_web::{delete, get, web, HttpResponse, Result as ActixResult};
use common::{FileRecord, ListFilesQuery, QuotaResponse};
use tracing::{info, warn};

/// List the caller's records directly under a container (root when absent)
#[get("/files")]
pub async fn list_files(
    principal: AuthenticatedPrincipal,
    query: web::Query<ListFilesQuery>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let parent_id = query.parent_id.as_deref().filter(|p| !p.is_empty());
    if let Some(parent_id) = parent_id {
        containers::owned_folder(state.storage.as_ref(), principal.id(), parent_id).await?;
    }

    let records: Vec<FileRecord> = state
        .storage
        .list_children(principal.id(), parent_id)
        .await
        .map_err(ServiceError::from)?
        .iter()
        .map(|f| f.to_record())
        .collect();

    Ok(HttpResponse::Ok().json(records))
}

/// Delete a file at the provider, drop its record and credit its size back
#[delete("/files/{id}")]
pub async fn delete_file(
    principal: AuthenticatedPrincipal,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let file_id = path.into_inner();
    info!(principal = %principal.id(), file_id = %file_id, "DELETE /files - Request received");

    let record = state
        .storage
        .find_file(&file_id)
        .await
        .map_err(ServiceError::from)?
        .filter(|f| f.owner_id == principal.id())
        .ok_or_else(|| ServiceError::NotFound(format!("File {} not found", file_id)))?;
    if record.is_folder() {
        return Err(ServiceError::BadRequest("Folders cannot be deleted".into()).into());
    }

    let gateway = state.gateway()?;
    match gateway.delete_object(&record.provider_object_id).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            warn!(object_id = %record.provider_object_id, "Object already gone at provider");
        }
        Err(e) => return Err(ServiceError::from(e).into()),
    }

    if let Some(removed) = state
        .storage
        .delete_file(&record.id)
        .await
        .map_err(ServiceError::from)?
    {
        state
            .storage
            .release(&removed.owner_id, removed.size)
            .await
            .map_err(ServiceError::from)?;
    }

    Ok(HttpResponse::NoContent().finish())
}

#[get("/quota")]
pub async fn quota(
    principal: AuthenticatedPrincipal,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let quota = state
        .storage
        .quota(principal.id())
        .await
        .map_err(ServiceError::from)?;
    Ok(HttpResponse::Ok().json(QuotaResponse {
        max_storage: quota.max_storage,
        used_storage: quota.used_storage,
    }))
}
