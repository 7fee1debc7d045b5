//! Transport bindings: how commands reach the worker and responses come back.
//!
//! The supervisor and client only ever talk to a [`TransportBinding`]. Each
//! binding owns its channel resources (a FIFO node, a scratch directory) and
//! knows which launch flags tell the worker where to answer.

mod sentinel;
mod socket;

#[cfg(unix)]
mod pipe;

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::ChildStdin;
use std::time::{Duration, Instant};

use bytes::Bytes;
use nlpwire_frame::FrameError;
use nlpwire_transport::TransportError;

use crate::config::{ClientConfig, TransportKind};
use crate::error::Result;

pub use sentinel::SentinelBinding;
pub use socket::SocketBinding;

#[cfg(unix)]
pub use pipe::PipeBinding;

/// Why a single request/response exchange produced no payload.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The worker process exited before answering.
    #[error("worker crashed during the exchange")]
    Crashed,

    /// The deadline passed with the worker still alive.
    #[error("no response after {0:?}")]
    TimedOut(Duration),

    /// The worker could not be reached (socket connect exhausted).
    #[error("worker unreachable: {0}")]
    Refused(#[source] TransportError),

    /// The channel closed before a full response arrived.
    #[error("channel closed before a response arrived")]
    Closed,

    /// The response could not be framed.
    #[error("framing failed: {0}")]
    Protocol(#[source] FrameError),
}

impl ExchangeError {
    /// Fold a frame-level failure into an exchange outcome.
    ///
    /// Broken pipes and resets count as a crash only once the worker is
    /// confirmed gone.
    pub(crate) fn from_frame(err: FrameError, alive: &mut dyn FnMut() -> bool) -> Self {
        match err {
            FrameError::TimedOut(elapsed) => ExchangeError::TimedOut(elapsed),
            FrameError::PeerExited => ExchangeError::Crashed,
            FrameError::ConnectionClosed => ExchangeError::Closed,
            FrameError::Io(err)
                if matches!(
                    err.kind(),
                    ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof
                ) =>
            {
                if alive() {
                    ExchangeError::Closed
                } else {
                    ExchangeError::Crashed
                }
            }
            other => ExchangeError::Protocol(other),
        }
    }
}

/// A command/response channel to one worker process.
///
/// Lifecycle, driven by the supervisor on every (re)start:
/// `prepare` → spawn with `launch_args` → `attach` → any number of
/// `exchange` calls → `detach`. `cleanup` releases everything the binding
/// owns and is safe to call more than once.
pub trait TransportBinding: Send {
    fn kind(&self) -> TransportKind;

    /// Flags that tell the worker which channel to answer on.
    fn launch_args(&self) -> Vec<String>;

    /// Whether commands travel over the worker's standard input.
    fn needs_stdin(&self) -> bool;

    /// Whether every exchange opens a fresh connection. Such bindings can
    /// abandon a handshake attempt without leaving a reply queued.
    fn reconnects_per_call(&self) -> bool;

    /// Create channel resources before the worker is spawned.
    fn prepare(&mut self) -> Result<()>;

    /// Bind to a freshly spawned worker.
    fn attach(&mut self, stdin: Option<ChildStdin>) -> Result<()>;

    /// Send one command and wait for its response until `deadline`.
    ///
    /// `alive` reports whether the worker process is still running.
    fn exchange(
        &mut self,
        verb: &str,
        argument_json: &str,
        deadline: Instant,
        alive: &mut dyn FnMut() -> bool,
    ) -> std::result::Result<Bytes, ExchangeError>;

    /// Drop per-worker handles (stdin, readers). Owned paths survive.
    fn detach(&mut self);

    /// Release every owned resource, including filesystem paths.
    fn cleanup(&mut self);

    /// Filesystem paths this binding created and must remove at teardown.
    fn owned_paths(&self) -> Vec<PathBuf>;
}

/// Build the binding selected by `config.transport.kind`.
pub fn binding_for(config: &ClientConfig) -> Result<Box<dyn TransportBinding>> {
    let frame = config.frame.frame_config();
    match config.transport.kind {
        TransportKind::Socket => Ok(Box::new(SocketBinding::new(
            config.transport.port,
            config.transport.connect_retry(),
            frame,
        ))),
        #[cfg(unix)]
        TransportKind::Pipe => Ok(Box::new(PipeBinding::new(
            config.transport.pipe_prefix.clone(),
            frame,
        ))),
        #[cfg(not(unix))]
        TransportKind::Pipe => Err(crate::error::WorkerError::Config(
            "the pipe transport needs a unix platform".to_string(),
        )),
        TransportKind::Sentinel => Ok(Box::new(SentinelBinding::new(frame))),
    }
}
