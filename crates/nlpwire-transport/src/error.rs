use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors that can occur while establishing or using a worker transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Every connect attempt failed.
    #[error("failed to connect to {addr} after {attempts} attempts: {source}")]
    Connect {
        addr: SocketAddr,
        attempts: u32,
        source: std::io::Error,
    },

    /// Failed to create, open or remove a FIFO.
    #[error("fifo error at {path}: {source}")]
    Fifo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The FIFO path is already taken by something else.
    #[error("fifo path already exists and is not a fifo: {0}")]
    PathInUse(PathBuf),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker process exited while we were waiting on it.
    #[error("worker process exited")]
    PeerExited,

    /// The caller's deadline passed before the operation completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl TransportError {
    /// True when the failure is the worker not listening yet.
    pub fn is_refused(&self) -> bool {
        matches!(
            self,
            TransportError::Connect { source, .. }
                if source.kind() == std::io::ErrorKind::ConnectionRefused
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
