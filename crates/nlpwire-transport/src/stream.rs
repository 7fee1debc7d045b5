use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A connected byte channel to the worker.
///
/// Socket streams are duplex. FIFO streams only carry responses; commands for
/// a FIFO-attached worker go to its standard input instead, so writing to the
/// FIFO variant is rejected.
pub struct WorkerStream {
    inner: WorkerStreamInner,
}

enum WorkerStreamInner {
    Tcp(std::net::TcpStream),
    #[cfg(unix)]
    Fifo(std::fs::File),
}

impl Read for WorkerStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            WorkerStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            WorkerStreamInner::Fifo(file) => file.read(buf),
        }
    }
}

impl Write for WorkerStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            WorkerStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            WorkerStreamInner::Fifo(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "response fifo is read-only",
            )),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            WorkerStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            WorkerStreamInner::Fifo(_) => Ok(()),
        }
    }
}

impl WorkerStream {
    pub(crate) fn from_tcp(stream: std::net::TcpStream) -> Self {
        Self {
            inner: WorkerStreamInner::Tcp(stream),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_fifo(file: std::fs::File) -> Self {
        Self {
            inner: WorkerStreamInner::Fifo(file),
        }
    }

    /// Bound how long a single read may block.
    ///
    /// FIFO streams are opened non-blocking, so this only affects sockets.
    pub fn set_poll_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            WorkerStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            WorkerStreamInner::Fifo(_) => Ok(()),
        }
    }

    /// Bound how long a single write may block (sockets only).
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            WorkerStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            WorkerStreamInner::Fifo(_) => Ok(()),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            WorkerStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            WorkerStreamInner::Fifo(_) => "fifo",
        }
    }
}

impl std::fmt::Debug for WorkerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
