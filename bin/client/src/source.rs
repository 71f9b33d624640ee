//! Where an item's bytes come from while the process holds them

use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// The resident binary handle of an upload item. Never persisted.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    fn len(&self) -> u64;

    async fn read_chunk(&self, start: u64, len: usize) -> std::io::Result<Bytes>;
}

pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{:?} is not a regular file", path),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            len: metadata.len(),
        })
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_chunk(&self, start: u64, len: usize) -> std::io::Result<Bytes> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
pub struct MemorySource(pub Bytes);

#[cfg(test)]
#[async_trait]
impl ChunkSource for MemorySource {
    fn len(&self) -> u64 {
        self.0.len() as u64
    }

    async fn read_chunk(&self, start: u64, len: usize) -> std::io::Result<Bytes> {
        let start = start as usize;
        let end = start.saturating_add(len);
        if end > self.0.len() {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        Ok(self.0.slice(start..end))
    }
}
