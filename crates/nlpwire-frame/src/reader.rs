use std::io::{ErrorKind, Read};
use std::time::Instant;

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::codec::{decode_frame, peek_payload_len, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads length-prefixed response frames from any `Read` stream.
///
/// The stream is expected to be non-blocking or to carry a short read
/// timeout: a read that fails with `WouldBlock` or `TimedOut` counts as one
/// idle poll. Between idle polls the reader sleeps for the configured poll
/// interval, checks the worker liveness callback and the deadline.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next frame with no deadline and no liveness check.
    pub fn read_frame(&mut self) -> Result<Frame> {
        self.read_frame_until(None, &mut || true)
    }

    /// Read the next complete frame.
    ///
    /// Fails with [`FrameError::TimedOut`] once `deadline` passes,
    /// [`FrameError::PeerExited`] once `alive` reports false, and
    /// [`FrameError::Incomplete`] when a started payload goes idle for more
    /// than the configured poll budget.
    pub fn read_frame_until(
        &mut self,
        deadline: Option<Instant>,
        alive: &mut dyn FnMut() -> bool,
    ) -> Result<Frame> {
        let started = Instant::now();
        let mut idle_payload_polls = 0u32;
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                debug!(len = frame.payload.len(), "received response frame");
                return Ok(frame);
            }

            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    continue;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(err) => return Err(FrameError::Io(err)),
            }

            if !alive() {
                return Err(FrameError::PeerExited);
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(FrameError::TimedOut(started.elapsed()));
                }
            }

            if let Some(expected) = peek_payload_len(&self.buf) {
                idle_payload_polls += 1;
                if idle_payload_polls > self.config.idle_poll_budget {
                    let received = self.buf.len() - HEADER_SIZE;
                    warn!(received, expected, "incomplete value from server");
                    return Err(FrameError::Incomplete { received, expected });
                }
            }

            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Drop any partially buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Number of bytes buffered but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
