//! Client configuration constants

/// Default client data directory
pub const CLIENT_DATA_DIR: &str = "client_data";

/// Persisted queue filename
pub const QUEUE_FILE: &str = "upload_queue.json";

/// Default server URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Items transferred at once unless the persisted queue says otherwise
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Automatic whole-item retries after a transient failure
pub const MAX_RETRIES: u32 = 3;

/// Backoff before retry `n` is `2^n * BASE_BACKOFF_MS`
pub const BASE_BACKOFF_MS: u64 = 2000;

/// Session endpoint path
pub const SESSION_ENDPOINT: &str = "/files/upload/session";

/// Finalize endpoint path
pub const COMPLETE_ENDPOINT: &str = "/files/upload/complete";

/// Signed link endpoint, relative to `/files/{id}`
pub const SIGNED_URL_SUFFIX: &str = "/signed-url";
