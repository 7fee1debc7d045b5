use std::time::Duration;

/// Errors that can occur while encoding commands or reading response frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The response length prefix exceeds the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: u64, max: usize },

    /// A command would corrupt the line-oriented request stream.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// An I/O error occurred while reading or writing.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached EOF before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// No complete frame arrived before the deadline.
    #[error("timed out waiting for response after {0:?}")]
    TimedOut(Duration),

    /// The worker process exited while a response was pending.
    #[error("worker exited while a response was pending")]
    PeerExited,

    /// The payload stalled past the idle-poll budget.
    #[error("incomplete value from server ({received} of {expected} bytes)")]
    Incomplete { received: usize, expected: u64 },
}

impl From<nlpwire_transport::TransportError> for FrameError {
    fn from(err: nlpwire_transport::TransportError) -> Self {
        match err {
            nlpwire_transport::TransportError::Io(io) => FrameError::Io(io),
            nlpwire_transport::TransportError::Connect { source, .. }
            | nlpwire_transport::TransportError::Fifo { source, .. } => FrameError::Io(source),
            nlpwire_transport::TransportError::PeerExited => FrameError::PeerExited,
            other => FrameError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
