use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload exceeds the limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("upload stream interrupted: {0}")]
    Stream(#[source] io::Error),

    #[error("failed to write upload to disk: {0}")]
    Io(#[from] io::Error),
}

/// Writes an incoming upload to a scratch file, refusing to grow past `limit`.
pub struct DiskUploader {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
    limit: u64,
}

impl DiskUploader {
    pub async fn create(path: &Path, limit: u64) -> Result<Self, UploadError> {
        let file = File::create(path).await?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
            limit,
        })
    }

    pub async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), UploadError> {
        let next = self.written + chunk.len() as u64;
        if next > self.limit {
            return Err(UploadError::TooLarge { limit: self.limit });
        }

        self.writer.write_all(&chunk).await?;
        self.written = next;
        Ok(())
    }

    /// Flushes the file and returns the number of bytes stored.
    pub async fn finish(mut self) -> Result<u64, UploadError> {
        self.writer.flush().await?;
        self.writer.get_mut().sync_data().await?;
        debug!(path = %self.path.display(), bytes = self.written, "Upload stored");
        Ok(self.written)
    }
}

/// Drains `upload` into `path`. A partially written file is left for the
/// caller's scratch cleanup to remove.
pub async fn stream_to_disk<S>(upload: S, path: &Path, limit: u64) -> Result<u64, UploadError>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut upload = std::pin::pin!(upload);
    let mut uploader = DiskUploader::create(path, limit).await?;

    while let Some(chunk) = upload.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!("Upload stream error: {}", e);
                return Err(UploadError::Stream(e));
            }
        };

        uploader.write_chunk(chunk).await?;
    }

    uploader.finish().await
}
