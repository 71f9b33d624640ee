//! Drives one upload item through the resumable protocol

use crate::api::{ApiError, UploadApi};
use crate::queue::UploadItem;
use crate::source::ChunkSource;
use common::{CompleteUploadRequest, FileRecord, UploadSessionRequest};
use drive::{Chunk, ResumableTransport, TransferError, TransferProgress, CHUNK_SIZE};
use log::{debug, info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Consecutive chunk answers that may leave the offset unchanged before the
/// attempt is abandoned
const MAX_STALLED_CHUNKS: u32 = 3;

/// How an attempt ended, from the queue's point of view
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadFailure {
    /// Network-level or 5xx; the whole item may be retried
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Fatal(String),
    #[error("upload cancelled")]
    Cancelled,
}

impl From<TransferError> for UploadFailure {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Cancelled => UploadFailure::Cancelled,
            e if e.is_retryable() => UploadFailure::Transient(e.to_string()),
            e => UploadFailure::Fatal(e.to_string()),
        }
    }
}

impl From<ApiError> for UploadFailure {
    fn from(err: ApiError) -> Self {
        if err.is_retryable() {
            UploadFailure::Transient(err.to_string())
        } else {
            UploadFailure::Fatal(err.to_string())
        }
    }
}

/// Durable facts learned mid-transfer; the queue persists them as they arrive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    SessionOpened {
        session_url: String,
        unique_file_name: String,
    },
    SessionDiscarded,
    Progress(u8),
}

pub struct Transfer<'a> {
    api: &'a dyn UploadApi,
    transport: &'a dyn ResumableTransport,
    chunk_size: u64,
}

impl<'a> Transfer<'a> {
    pub fn new(api: &'a dyn UploadApi, transport: &'a dyn ResumableTransport) -> Self {
        Self {
            api,
            transport,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub async fn run(
        &self,
        item: &UploadItem,
        source: &dyn ChunkSource,
        cancel: &CancellationToken,
        on_event: &mut (dyn FnMut(TransferEvent) + Send),
    ) -> Result<FileRecord, UploadFailure> {
        let total = item.size;
        if source.len() != total {
            return Err(UploadFailure::Fatal(format!(
                "{} changed size: expected {} bytes, found {}",
                item.file_name,
                total,
                source.len()
            )));
        }

        let mut resumed = None;
        if let (Some(url), Some(key)) = (&item.session_url, &item.unique_file_name) {
            match self.transport.probe(url, total, cancel).await {
                Ok(TransferProgress::Complete {
                    object_id: Some(object_id),
                }) => {
                    info!("{}: provider already holds the whole file", item.file_name);
                    return self.finalize(item, key, object_id).await;
                }
                Ok(TransferProgress::Complete { object_id: None }) => {
                    return Err(UploadFailure::Fatal(format!(
                        "Provider reports {} completed without an object id",
                        item.file_name
                    )));
                }
                Ok(TransferProgress::Incomplete { next_offset }) if next_offset <= total => {
                    info!("{}: resuming at byte {}", item.file_name, next_offset);
                    resumed = Some((url.clone(), key.clone(), next_offset));
                }
                Ok(other) => {
                    warn!("{}: unusable probe answer {:?}, starting over", item.file_name, other);
                }
                Err(TransferError::Cancelled) => return Err(UploadFailure::Cancelled),
                Err(e) => {
                    warn!("{}: stored session unusable ({}), starting over", item.file_name, e);
                }
            }
            if resumed.is_none() {
                on_event(TransferEvent::SessionDiscarded);
            }
        }

        let (session_url, unique_file_name, mut offset) = match resumed {
            Some(resumed) => resumed,
            None => {
                let session = self
                    .api
                    .open_session(&UploadSessionRequest {
                        file_name: item.file_name.clone(),
                        size: total,
                        mime_type: item.mime_type.clone(),
                        parent_id: item.parent_id.clone(),
                    })
                    .await?;
                info!("{}: session opened", item.file_name);
                on_event(TransferEvent::SessionOpened {
                    session_url: session.session_url.clone(),
                    unique_file_name: session.unique_file_name.clone(),
                });
                (session.session_url, session.unique_file_name, 0)
            }
        };

        let mut stalled = 0;
        while offset < total {
            let len = self.chunk_size.min(total - offset);
            let data = source
                .read_chunk(offset, len as usize)
                .await
                .map_err(|e| UploadFailure::Fatal(format!("Failed to read {}: {}", item.file_name, e)))?;
            let chunk = Chunk {
                start: offset,
                total,
                mime_type: item.mime_type.clone(),
                data,
            };
            debug!("{}: sending {}", item.file_name, chunk.content_range());

            match self.transport.put_chunk(&session_url, chunk, cancel).await? {
                TransferProgress::Complete {
                    object_id: Some(object_id),
                } => return self.finalize(item, &unique_file_name, object_id).await,
                TransferProgress::Complete { object_id: None } => {
                    return Err(UploadFailure::Fatal(
                        "Provider finished the upload without an object id".to_string(),
                    ))
                }
                TransferProgress::Incomplete { next_offset } => {
                    if next_offset != offset + len {
                        warn!(
                            "{}: provider expects byte {} instead of {}",
                            item.file_name,
                            next_offset,
                            offset + len
                        );
                    }
                    if next_offset > total {
                        return Err(UploadFailure::Fatal(format!(
                            "Provider reported offset {} beyond {} bytes",
                            next_offset, total
                        )));
                    }
                    if next_offset <= offset {
                        stalled += 1;
                        if stalled >= MAX_STALLED_CHUNKS {
                            return Err(UploadFailure::Transient(format!(
                                "Provider stopped accepting bytes at offset {}",
                                offset
                            )));
                        }
                    } else {
                        stalled = 0;
                    }
                    offset = next_offset;
                    on_event(TransferEvent::Progress(percent(offset, total)));
                }
            }
        }

        Err(UploadFailure::Fatal(
            "Provider did not confirm the final chunk".to_string(),
        ))
    }

    async fn finalize(
        &self,
        item: &UploadItem,
        unique_file_name: &str,
        object_id: String,
    ) -> Result<FileRecord, UploadFailure> {
        let record = self
            .api
            .complete_upload(&CompleteUploadRequest {
                drive_file_id: object_id,
                original_name: item.file_name.clone(),
                file_name: unique_file_name.to_string(),
                size: item.size,
                mime_type: item.mime_type.clone(),
                parent_id: item.parent_id.clone(),
            })
            .await?;
        info!("{}: stored as {}", item.file_name, record.id);
        Ok(record)
    }
}

fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done.saturating_mul(100)) / total).min(100) as u8
}
