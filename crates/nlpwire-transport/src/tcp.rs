use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::WorkerStream;

/// A loopback TCP port a worker listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpEndpoint {
    pub port: u16,
}

impl TcpEndpoint {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}

/// Bounded connect-retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRetry {
    /// Total connect attempts before giving up. Always at least one.
    pub attempts: u32,
    /// Fixed pause between attempts.
    pub backoff: Duration,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            attempts: 100,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Dial `endpoint`, retrying while the worker is still booting.
///
/// `alive` is consulted before every attempt; once it reports false the dial
/// stops with [`TransportError::PeerExited`]. A `deadline` cuts the retry loop
/// short with [`TransportError::DeadlineExceeded`].
pub fn connect_with_retry(
    endpoint: TcpEndpoint,
    retry: &ConnectRetry,
    deadline: Option<Instant>,
    alive: &mut dyn FnMut() -> bool,
) -> Result<WorkerStream> {
    let addr = endpoint.addr();
    let attempts = retry.attempts.max(1);

    for attempt in 1..=attempts {
        if !alive() {
            return Err(TransportError::PeerExited);
        }

        match TcpStream::connect(addr) {
            Ok(stream) => {
                debug!(%addr, attempt, "connected to worker socket");
                return Ok(WorkerStream::from_tcp(stream));
            }
            Err(err) => {
                debug!(%addr, attempt, error = %err, "socket connect failed");
                if attempt == attempts {
                    return Err(TransportError::Connect {
                        addr,
                        attempts,
                        source: err,
                    });
                }
                if let Some(deadline) = deadline {
                    if Instant::now() + retry.backoff >= deadline {
                        return Err(TransportError::DeadlineExceeded);
                    }
                }
                std::thread::sleep(retry.backoff);
            }
        }
    }

    Err(TransportError::DeadlineExceeded)
}
