use std::path::PathBuf;
use std::time::Duration;

/// Errors that stop a client from being built or a worker from being started.
///
/// Per-call failures (timeouts, bad payloads, crashes that exhaust the retry
/// ceiling) never surface as `WorkerError`; they are folded into
/// [`Response::Null`](crate::Response::Null).
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// A required engine resource is not on disk.
    #[error("engine resource not found: {}", .0.display())]
    MissingResource(PathBuf),

    /// None of the configured engine jars exist.
    #[error("engine jar files don't seem to exist; searched: {0:?}")]
    MissingJars(Vec<String>),

    /// The engine configuration is contradictory or incomplete.
    #[error("invalid engine configuration: {0}")]
    Config(String),

    /// Spawning the worker process failed.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker never answered PING within the startup ceiling.
    #[error("worker did not become ready within {0:?}")]
    HandshakeTimeout(Duration),

    /// The worker answered PING with something other than PONG.
    #[error("protocol mismatch on startup ping: {0}")]
    ProtocolMismatch(String),

    /// The worker exited before completing the handshake.
    #[error(
        "worker exited during startup{}",
        .0.as_ref().map(|status| format!(" ({status})")).unwrap_or_default()
    )]
    StartupCrashed(Option<String>),

    /// Transport setup failed.
    #[error("transport error: {0}")]
    Transport(#[from] nlpwire_transport::TransportError),

    /// Frame-level failure outside a request (e.g. while attaching a channel).
    #[error("frame error: {0}")]
    Frame(#[from] nlpwire_frame::FrameError),

    /// Scratch directory or temp file handling failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A previous (re)start failed; the client will not spawn again.
    #[error("worker unavailable after failed start: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
