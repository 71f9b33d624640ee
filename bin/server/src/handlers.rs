//! HTTP request handlers

pub mod error;
pub mod files;
pub mod folders;
pub mod health;
pub mod signed;
pub mod upload;

use actix_web::web;
use error::{handle_error, ServiceError};

/// Register every route; shared by `main` and the handler tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| handle_error("Invalid request body", err).into()),
    )
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        ServiceError::InvalidSignedGrant(format!("Invalid query parameters: {}", err)).into()
    }))
    .service(upload::create_session)
    .service(upload::complete_upload)
    .service(files::list_files)
    .service(files::delete_file)
    .service(files::quota)
    .service(folders::create_folder)
    .service(signed::signed_url)
    .service(signed::signed_view)
    .service(signed::signed_download)
    .service(health::health);
}
