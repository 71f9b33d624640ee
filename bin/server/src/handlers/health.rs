use crate::handlers::error::ServiceError;
use crate::state::AppState;
use actix_web::{get, web, HttpResponse, Result as ActixResult};
use common::HealthResponse;

/// Liveness plus a metadata store round trip
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    state
        .storage
        .principal_for_token("health-probe")
        .await
        .map_err(ServiceError::from)?;
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
    }))
}
