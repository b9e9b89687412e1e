use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{IoError, IoResult};

/// Leading bytes inspected for NUL when classifying a file as binary.
pub const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// Whole-file read/write collaborator.
pub trait FileSystem: Send + Sync + 'static {
    fn read_file(&self, path: &Path) -> impl Future<Output = IoResult<String>> + Send;

    fn write_file(&self, path: &Path, text: String) -> impl Future<Output = IoResult<()>> + Send;
}

/// Local disk through `tokio::fs`.
#[derive(Debug, Clone)]
pub struct LocalFs {
    max_file_bytes: u64,
}

impl LocalFs {
    pub fn new(max_file_bytes: u64) -> Self {
        Self { max_file_bytes }
    }
}

impl FileSystem for LocalFs {
    async fn read_file(&self, path: &Path) -> IoResult<String> {
        read_text(path, self.max_file_bytes).await
    }

    async fn write_file(&self, path: &Path, text: String) -> IoResult<()> {
        let len = text.len();
        tokio::fs::write(path, text)
            .await
            .map_err(|e| IoError::from_io(path, e))?;
        debug!(target: "io", path = %path.display(), bytes = len, "file_written");
        Ok(())
    }
}

pub fn looks_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_SNIFF_BYTES)].contains(&0)
}

/// Read a file as UTF-8 after size and binary checks.
pub async fn read_text(path: &Path, max_file_bytes: u64) -> IoResult<String> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| IoError::from_io(path, e))?;
    if meta.len() > max_file_bytes {
        warn!(
            target: "io",
            path = %path.display(),
            size = meta.len(),
            limit = max_file_bytes,
            "file_too_large"
        );
        return Err(IoError::TooLarge {
            path: path.to_path_buf(),
            size: meta.len(),
            limit: max_file_bytes,
        });
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| IoError::from_io(path, e))?;
    if looks_binary(&bytes) {
        warn!(target: "io", path = %path.display(), "binary_file_refused");
        return Err(IoError::Binary {
            path: path.to_path_buf(),
        });
    }
    let text = String::from_utf8(bytes).map_err(|_| IoError::InvalidUtf8 {
        path: PathBuf::from(path),
    })?;
    debug!(target: "io", path = %path.display(), bytes = text.len(), "file_read");
    Ok(text)
}
