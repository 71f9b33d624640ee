/// Default data directory for filesystem storage
pub const DEFAULT_DATA_DIR: &str = "server_data";

/// Default server host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port
pub const DEFAULT_PORT: &str = "8080";

/// Storage type identifier for database
pub const STORAGE_TYPE_DATABASE: &str = "db";

/// Storage type identifier for filesystem (also used as the default storage type)
pub const STORAGE_TYPE_FILESYSTEM: &str = "fs";

/// Quota given to newly provisioned principals (1 GiB)
pub const DEFAULT_MAX_STORAGE: u64 = 1024 * 1024 * 1024;

/// Upper bound for a requested signed-link lifetime (7 days)
pub const MAX_SIGNED_URL_TTL_MINUTES: u64 = 7 * 24 * 60;

/// Mime type assumed when the client declares none
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Provider folder name of a principal's root container
pub fn root_container_name(principal_id: &str) -> String {
    format!("user-{}", principal_id)
}
