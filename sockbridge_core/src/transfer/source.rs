//! Byte sources the upload engine can slice into chunks

use bytes::Bytes;
use std::future::Future;
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

/// A byte-addressable source of known length
pub trait ChunkSource: Send {
    /// Total length in bytes
    fn size(&self) -> u64;

    /// Read `len` bytes starting at `offset`. Fewer bytes are returned only
    /// at the end of the source.
    fn read_chunk(
        &mut self,
        offset: u64,
        len: usize,
    ) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

/// File on disk
pub struct FileSource {
    file: File,
    size: u64,
}

impl FileSource {
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok(Self { file, size })
    }
}

impl ChunkSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_chunk(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = Vec::with_capacity(len);
        (&mut self.file).take(len as u64).read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

/// In-memory buffer
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl ChunkSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_chunk(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?
            .min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        Ok(self.data.slice(start..end).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_memory_source_short_last_chunk() {
        let mut src = MemorySource::new(vec![1u8, 2, 3, 4, 5]);
        assert_eq!(src.size(), 5);
        assert_eq!(src.read_chunk(0, 2).await.unwrap(), vec![1, 2]);
        assert_eq!(src.read_chunk(4, 2).await.unwrap(), vec![5]);
        assert!(src.read_chunk(10, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_source_reads_ranges() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"hello world").unwrap();
        tmp.flush().unwrap();

        let mut src = FileSource::open(tmp.path()).await.unwrap();
        assert_eq!(src.size(), 11);
        assert_eq!(src.read_chunk(6, 5).await.unwrap(), b"world");
        assert_eq!(src.read_chunk(0, 5).await.unwrap(), b"hello");
        assert_eq!(src.read_chunk(8, 100).await.unwrap(), b"rld");
    }
}
