//! Remote object store access: management gateway and resumable uploads

pub mod error;
pub mod gateway;
pub mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod resumable;

pub use error::{GatewayError, TransferError};
pub use gateway::{
    NewPermission, Permission, RemoteObject, RemoteStorageGateway, SessionTarget,
    FOLDER_MIME_TYPE,
};
pub use http::{DriveConfig, DriveCredentials, HttpDriveGateway};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{Fault, MemoryDrive, ReceivedChunk};
pub use resumable::{
    Chunk, HttpTransport, ResumableTransport, TransferProgress, CHUNK_SIZE,
};
