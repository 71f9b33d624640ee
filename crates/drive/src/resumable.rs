//! Resumable upload wire contract.
//!
//! A session URL accepts two kinds of PUT: an empty status probe with
//! `Content-Range: bytes */<total>`, and chunk uploads with
//! `Content-Range: bytes <start>-<end>/<total>` (`end` inclusive).
//! `308` means more bytes are expected, `200`/`201` means the object is stored.

use crate::error::TransferError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// 2 MiB; the provider requires chunks in multiples of 256 KiB
pub const CHUNK_SIZE: u64 = 8 * 256 * 1024;

/// Status code the provider uses for "resume incomplete"
pub const RESUME_INCOMPLETE: u16 = 308;

/// Where a session stands after a probe or a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferProgress {
    /// More bytes expected; the next chunk must start at `next_offset`
    Incomplete { next_offset: u64 },
    /// The object is fully stored
    Complete { object_id: Option<String> },
}

/// One chunk of a resumable upload
#[derive(Debug, Clone)]
pub struct Chunk {
    pub start: u64,
    pub total: u64,
    pub mime_type: String,
    pub data: Bytes,
}

impl Chunk {
    /// Inclusive last byte index
    pub fn end(&self) -> u64 {
        self.start + self.data.len() as u64 - 1
    }

    pub fn content_range(&self) -> String {
        content_range(self.start, self.end(), self.total)
    }
}

/// The two calls a client makes against a session URL.
/// Implementations must abort on `cancel` and must not retry internally.
#[async_trait]
pub trait ResumableTransport: Send + Sync {
    async fn probe(
        &self,
        session_url: &str,
        total: u64,
        cancel: &CancellationToken,
    ) -> Result<TransferProgress, TransferError>;

    async fn put_chunk(
        &self,
        session_url: &str,
        chunk: Chunk,
        cancel: &CancellationToken,
    ) -> Result<TransferProgress, TransferError>;
}

pub fn content_range(start: u64, end_inclusive: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", start, end_inclusive, total)
}

pub fn probe_range(total: u64) -> String {
    format!("bytes */{}", total)
}

/// Parse a `range: bytes=0-<last>` header into the next offset (`last + 1`)
pub fn parse_range_header(value: &str) -> Option<u64> {
    let range = value.trim().strip_prefix("bytes=")?;
    let (_, last) = range.split_once('-')?;
    last.trim().parse::<u64>().ok().map(|last| last + 1)
}

/// Byte spans `[start, end)` for a clean upload of `total` bytes from `offset`
pub fn chunk_spans(offset: u64, total: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let mut spans = Vec::new();
    let mut start = offset;
    while start < total {
        let end = (start + chunk_size).min(total);
        spans.push((start, end));
        start = end;
    }
    spans
}

#[derive(Deserialize)]
struct CompletedObject {
    id: Option<String>,
}

/// Extract the object id from a completion body; tolerant of non-JSON bodies
pub fn object_id_from_body(body: &str) -> Option<String> {
    serde_json::from_str::<CompletedObject>(body)
        .ok()
        .and_then(|o| o.id)
        .filter(|id| !id.is_empty())
}

/// Interpret a probe or chunk response
pub fn classify_response(
    status: u16,
    range: Option<&str>,
    body: &str,
) -> Result<TransferProgress, TransferError> {
    match status {
        RESUME_INCOMPLETE => Ok(TransferProgress::Incomplete {
            next_offset: range.and_then(parse_range_header).unwrap_or(0),
        }),
        200 | 201 => Ok(TransferProgress::Complete {
            object_id: object_id_from_body(body),
        }),
        other => Err(TransferError::from_status(other, body.to_string())),
    }
}

/// `reqwest` implementation talking to the provider directly
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// A client that treats 308 as a status, not a redirect to follow
    pub fn with_default_client() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::new(client))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<TransferProgress, TransferError> {
        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| TransferError::Network(e.to_string()))?;
            let status = response.status().as_u16();
            let range = response
                .headers()
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = response
                .text()
                .await
                .map_err(|e| TransferError::Network(e.to_string()))?;
            classify_response(status, range.as_deref(), &body)
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            result = exchange => result,
        }
    }
}

#[async_trait]
impl ResumableTransport for HttpTransport {
    async fn probe(
        &self,
        session_url: &str,
        total: u64,
        cancel: &CancellationToken,
    ) -> Result<TransferProgress, TransferError> {
        let request = self
            .client
            .put(session_url)
            .header(CONTENT_RANGE, probe_range(total))
            .header(CONTENT_LENGTH, 0);
        self.send(request, cancel).await
    }

    async fn put_chunk(
        &self,
        session_url: &str,
        chunk: Chunk,
        cancel: &CancellationToken,
    ) -> Result<TransferProgress, TransferError> {
        let request = self
            .client
            .put(session_url)
            .header(CONTENT_TYPE, chunk.mime_type.as_str())
            .header(CONTENT_RANGE, chunk.content_range())
            .body(chunk.data);
        self.send(request, cancel).await
    }
}
