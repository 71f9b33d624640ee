//! Upload orchestration between the metadata store and the storage provider

pub mod containers;
pub mod finalize;
pub mod session;

pub use finalize::UploadFinalizer;
pub use session::UploadSessionCoordinator;
