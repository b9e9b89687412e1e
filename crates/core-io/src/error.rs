use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("file too large: {} is {size} bytes (limit {limit})", path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },
    #[error("binary file refused: {}", path.display())]
    Binary { path: PathBuf },
    #[error("file is not valid UTF-8: {}", path.display())]
    InvalidUtf8 { path: PathBuf },
    #[error("no virtual document open for {}", path.display())]
    NotOpen { path: PathBuf },
    #[error("line range {start}..{end} invalid for {} ({total} lines)", path.display())]
    Range {
        path: PathBuf,
        start: usize,
        end: usize,
        total: usize,
    },
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IoError {
    pub(crate) fn from_io(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            IoError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

pub type IoResult<T> = Result<T, IoError>;
