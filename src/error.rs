use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Crash reporting is already initialized for this process")]
    AlreadyInitialized,

    #[error("Failed to {op} {}: {source}", path.display())]
    StoreIo {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("Invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

impl Error {
    pub(crate) fn store(
        op: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::StoreIo {
            op,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Upload request failed: {0}")]
    Unreachable(String),

    #[error("Collector rejected upload with HTTP {0}")]
    Status(u16),
}
