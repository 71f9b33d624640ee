use crate::auth::AuthenticatedPrincipal;
use crate::handlers::error::{handle_error, ServiceError};
use crate::services::containers;
use crate::state::AppState;
use actix_web::{post, web, HttpResponse, Result as ActixResult};
use common::file_utils::validate_filename;
use common::CreateFolderRequest;
use drive::FOLDER_MIME_TYPE;
use storage::{FileKind, NewFile};
use tracing::info;

/// Create a container at the provider and index it
#[post("/folders")]
pub async fn create_folder(
    principal: AuthenticatedPrincipal,
    req: web::Json<CreateFolderRequest>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let name = req.name.trim();
    validate_filename(name).map_err(|e| handle_error("Invalid folder name", e))?;

    let storage = state.storage.as_ref();
    let parent = match &req.parent_id {
        Some(parent_id) => Some(containers::owned_folder(storage, principal.id(), parent_id).await?),
        None => None,
    };

    let gateway = state.gateway()?;
    let principal_record = storage
        .load_principal(principal.id())
        .await
        .map_err(ServiceError::from)?;
    let destination =
        containers::destination(storage, gateway, &principal_record, parent.as_ref()).await?;
    let folder_id = gateway
        .create_folder(name, Some(&destination))
        .await
        .map_err(ServiceError::from)?;

    let record = storage
        .insert_folder(NewFile {
            provider_object_id: folder_id,
            owner_id: principal.id().to_string(),
            original_name: name.to_string(),
            storage_key: name.to_string(),
            size: 0,
            mime_type: FOLDER_MIME_TYPE.to_string(),
            kind: FileKind::Folder,
            thumbnail_ref: None,
            preview_ref: None,
            parent_id: parent.map(|p| p.id),
        })
        .await
        .map_err(ServiceError::from)?;

    info!(principal = %principal.id(), folder_id = %record.id, name = ?name, "Folder created");
    Ok(HttpResponse::Created().json(record.to_record()))
}
