//! Transport primitives for a supervised engine process.
//!
//! Two byte channels are supported:
//! - a loopback TCP socket, dialed per request with connect-retry
//! - a named FIFO the engine writes responses into, opened once per worker
//!
//! Framing lives one layer up, in `nlpwire-frame`. Everything here deals in
//! raw bytes through [`WorkerStream`].

pub mod error;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod fifo;

pub use error::{Result, TransportError};
pub use stream::WorkerStream;
pub use tcp::{connect_with_retry, ConnectRetry, TcpEndpoint};

#[cfg(unix)]
pub use fifo::Fifo;
