use crate::constants::{
    DEFAULT_DATA_DIR, DEFAULT_HOST, DEFAULT_MAX_STORAGE, DEFAULT_PORT, STORAGE_TYPE_DATABASE,
    STORAGE_TYPE_FILESYSTEM,
};
use clap::{value_parser, Arg, ArgMatches, Command};
use crypto::DEFAULT_GRANT_TTL_MINUTES;
use drive::http::{DEFAULT_API_URL, DEFAULT_TOKEN_URL, DEFAULT_UPLOAD_URL};
use drive::{DriveConfig, DriveCredentials};
use std::path::PathBuf;
use storage::DatabaseRetryConfig;
use tracing::error;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Storage backend type
    pub storage_type: StorageType,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Data directory for filesystem storage
    pub data_dir: PathBuf,
    /// Database URL for database storage
    pub database_url: Option<String>,
    /// Database retry configuration
    pub database_retry_config: DatabaseRetryConfig,
    /// Shared HMAC secret for signed links
    pub signing_secret: Option<String>,
    pub signed_url_ttl_minutes: u64,
    /// Base of the signed view/download links handed to clients
    pub public_base_url: String,
    /// Storage provider; uploads are unavailable without it
    pub drive: Option<DriveConfig>,
    /// Quota for newly provisioned principals
    pub default_max_storage: u64,
}

/// Storage backend type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageType {
    Filesystem,
    Database,
}

/// What the process was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Serve,
    AddPrincipal {
        id: String,
        max_storage: Option<u64>,
    },
    /// Rebuild a principal's used storage from its file records
    RecomputeUsage { id: String },
}

fn invalid_input(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, message)
}

impl ServerConfig {
    pub fn command() -> Command {
        Command::new("server")
            .arg(
                Arg::new("storage")
                    .long("storage")
                    .value_name("TYPE")
                    .help("Storage backend type: 'fs' for filesystem or 'db' for database")
                    .default_value(STORAGE_TYPE_FILESYSTEM)
                    .global(true),
            )
            .arg(
                Arg::new("data-dir")
                    .long("data-dir")
                    .value_name("DIR")
                    .help("Data directory for filesystem storage")
                    .default_value(DEFAULT_DATA_DIR)
                    .global(true),
            )
            .arg(
                Arg::new("database-url")
                    .long("database-url")
                    .value_name("URL")
                    .help("Database URL for database storage (can also use DATABASE_URL env var)")
                    .global(true),
            )
            .arg(
                Arg::new("port")
                    .long("port")
                    .value_name("PORT")
                    .help("Server port (default: 8080, or SERVER_PORT env var)"),
            )
            .arg(
                Arg::new("host")
                    .long("host")
                    .value_name("HOST")
                    .help("Server host (default: 0.0.0.0, or SERVER_HOST env var)"),
            )
            .subcommand(
                Command::new("principal")
                    .about("Manage principals")
                    .subcommand_required(true)
                    .subcommand(
                        Command::new("add")
                            .about("Provision a principal and print its bearer token")
                            .arg(
                                Arg::new("id")
                                    .long("id")
                                    .value_name("ID")
                                    .required(true),
                            )
                            .arg(
                                Arg::new("max-storage")
                                    .long("max-storage")
                                    .value_name("BYTES")
                                    .value_parser(value_parser!(u64))
                                    .help("Storage quota in bytes (default: DEFAULT_MAX_STORAGE env var or 1 GiB)"),
                            ),
                    )
                    .subcommand(
                        Command::new("recompute")
                            .about("Recompute used storage from the metadata index")
                            .arg(
                                Arg::new("id")
                                    .long("id")
                                    .value_name("ID")
                                    .required(true),
                            ),
                    ),
            )
    }

    pub fn load() -> Result<(Self, ServerCommand), std::io::Error> {
        let matches = Self::command().get_matches();
        Self::from_matches(&matches, |key| std::env::var(key).ok())
    }

    /// Resolve settings with priority: command-line args > environment variables > defaults
    pub fn from_matches(
        matches: &ArgMatches,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, ServerCommand), std::io::Error> {
        let command = match matches.subcommand() {
            Some(("principal", principal)) => match principal.subcommand() {
                Some(("add", add)) => ServerCommand::AddPrincipal {
                    id: add.get_one::<String>("id").cloned().unwrap_or_default(),
                    max_storage: add.get_one::<u64>("max-storage").copied(),
                },
                Some(("recompute", recompute)) => ServerCommand::RecomputeUsage {
                    id: recompute.get_one::<String>("id").cloned().unwrap_or_default(),
                },
                _ => return Err(invalid_input("Unknown principal command".to_string())),
            },
            _ => ServerCommand::Serve,
        };

        // Determine storage type
        let storage_type_str = matches
            .get_one::<String>("storage")
            .map(|s| s.as_str())
            .unwrap_or(STORAGE_TYPE_FILESYSTEM);
        let storage_type = match storage_type_str {
            STORAGE_TYPE_DATABASE => StorageType::Database,
            STORAGE_TYPE_FILESYSTEM => StorageType::Filesystem,
            _ => {
                return Err(invalid_input(format!(
                    "Invalid storage type: {}. Must be '{}' or '{}'",
                    storage_type_str, STORAGE_TYPE_FILESYSTEM, STORAGE_TYPE_DATABASE
                )));
            }
        };

        let data_dir = PathBuf::from(
            matches
                .get_one::<String>("data-dir")
                .map(|s| s.as_str())
                .unwrap_or(DEFAULT_DATA_DIR),
        );

        let database_url = if storage_type == StorageType::Database {
            Some(
                matches
                    .get_one::<String>("database-url")
                    .cloned()
                    .or_else(|| env("DATABASE_URL"))
                    .ok_or_else(|| {
                        error!("Database URL required when using database storage. Set --database-url or DATABASE_URL env var");
                        invalid_input(
                            "Database URL required when using database storage. Set --database-url or DATABASE_URL env var".to_string(),
                        )
                    })?,
            )
        } else {
            None
        };

        let env_host = env("SERVER_HOST");
        let env_port = env("SERVER_PORT");

        let host = matches
            .get_one::<String>("host")
            .map(|s| s.as_str())
            .or(env_host.as_deref())
            .unwrap_or(DEFAULT_HOST)
            .to_string();

        let port_str = matches
            .get_one::<String>("port")
            .map(|s| s.as_str())
            .or(env_port.as_deref())
            .unwrap_or(DEFAULT_PORT);

        let port = port_str
            .parse()
            .map_err(|_| invalid_input(format!("Invalid port number: {}", port_str)))?;

        let signed_url_ttl_minutes = match env("SIGNED_URL_TTL_MINUTES") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|ttl| *ttl > 0)
                .ok_or_else(|| invalid_input(format!("Invalid SIGNED_URL_TTL_MINUTES: {}", raw)))?,
            None => DEFAULT_GRANT_TTL_MINUTES,
        };

        let default_max_storage = match env("DEFAULT_MAX_STORAGE") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| invalid_input(format!("Invalid DEFAULT_MAX_STORAGE: {}", raw)))?,
            None => DEFAULT_MAX_STORAGE,
        };

        let public_base_url = env("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        Ok((
            ServerConfig {
                storage_type,
                host,
                port,
                data_dir,
                database_url,
                database_retry_config: DatabaseRetryConfig::from_env(),
                signing_secret: env("SIGNING_SECRET").filter(|s| !s.is_empty()),
                signed_url_ttl_minutes,
                public_base_url,
                drive: drive_config(&env),
                default_max_storage,
            },
            command,
        ))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A static token wins over the refresh-token flow; neither means no provider
fn drive_config(env: &impl Fn(&str) -> Option<String>) -> Option<DriveConfig> {
    let credentials = match env("DRIVE_ACCESS_TOKEN").filter(|t| !t.is_empty()) {
        Some(token) => DriveCredentials::AccessToken(token),
        None => DriveCredentials::RefreshToken {
            client_id: env("DRIVE_CLIENT_ID")?,
            client_secret: env("DRIVE_CLIENT_SECRET")?,
            refresh_token: env("DRIVE_REFRESH_TOKEN")?,
            token_url: env("DRIVE_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
        },
    };
    Some(DriveConfig {
        api_url: env("DRIVE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        upload_url: env("DRIVE_UPLOAD_URL").unwrap_or_else(|| DEFAULT_UPLOAD_URL.to_string()),
        credentials,
    })
}
