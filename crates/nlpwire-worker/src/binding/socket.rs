use std::path::PathBuf;
use std::process::ChildStdin;
use std::time::{Duration, Instant};

use bytes::Bytes;
use nlpwire_frame::{CommandWriter, FrameConfig, FrameReader};
use nlpwire_transport::{connect_with_retry, ConnectRetry, TcpEndpoint, TransportError};
use tracing::debug;

use super::{ExchangeError, TransportBinding};
use crate::config::TransportKind;
use crate::error::Result;

/// Shortest read timeout handed to the socket; zero would mean "block".
const MIN_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Loopback TCP binding. Every exchange dials a fresh connection, writes one
/// command line and reads one response frame.
#[derive(Debug)]
pub struct SocketBinding {
    endpoint: TcpEndpoint,
    retry: ConnectRetry,
    frame: FrameConfig,
}

impl SocketBinding {
    pub fn new(port: u16, retry: ConnectRetry, frame: FrameConfig) -> Self {
        Self {
            endpoint: TcpEndpoint::new(port),
            retry,
            frame,
        }
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port
    }
}

impl TransportBinding for SocketBinding {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn launch_args(&self) -> Vec<String> {
        vec!["--server".to_string(), self.endpoint.port.to_string()]
    }

    fn needs_stdin(&self) -> bool {
        false
    }

    fn reconnects_per_call(&self) -> bool {
        true
    }

    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    fn attach(&mut self, _stdin: Option<ChildStdin>) -> Result<()> {
        Ok(())
    }

    fn exchange(
        &mut self,
        verb: &str,
        argument_json: &str,
        deadline: Instant,
        alive: &mut dyn FnMut() -> bool,
    ) -> std::result::Result<Bytes, ExchangeError> {
        let started = Instant::now();
        let stream = connect_with_retry(self.endpoint, &self.retry, Some(deadline), alive)
            .map_err(|err| match err {
                TransportError::PeerExited => ExchangeError::Crashed,
                TransportError::DeadlineExceeded => ExchangeError::TimedOut(started.elapsed()),
                other => ExchangeError::Refused(other),
            })?;

        let poll = self.frame.poll_interval.max(MIN_POLL_TIMEOUT);
        let write_budget = deadline.saturating_duration_since(Instant::now()).max(poll);
        stream
            .set_poll_timeout(Some(poll))
            .and_then(|()| stream.set_write_timeout(Some(write_budget)))
            .map_err(ExchangeError::Refused)?;

        let mut writer = CommandWriter::new(stream);
        writer
            .send(&[verb, argument_json])
            .map_err(|err| ExchangeError::from_frame(err, alive))?;

        let mut reader = FrameReader::with_config(writer.into_inner(), self.frame.clone());
        let frame = reader
            .read_frame_until(Some(deadline), alive)
            .map_err(|err| ExchangeError::from_frame(err, alive))?;
        debug!(
            port = self.endpoint.port,
            verb,
            len = frame.payload.len(),
            "socket exchange complete"
        );
        Ok(frame.payload)
    }

    fn detach(&mut self) {}

    fn cleanup(&mut self) {}

    fn owned_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}
