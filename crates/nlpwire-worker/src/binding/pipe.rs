use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::ChildStdin;
use std::time::Instant;

use bytes::Bytes;
use nlpwire_frame::{CommandWriter, FrameConfig, FrameReader};
use nlpwire_transport::{Fifo, WorkerStream};
use tracing::{debug, warn};

use super::{ExchangeError, TransportBinding};
use crate::config::TransportKind;
use crate::error::{Result, WorkerError};

/// Commands on the worker's stdin, responses through a named FIFO.
///
/// One FIFO serves the client for its whole life; restarts reopen it. A
/// response that arrives after its call timed out stays in the FIFO, so
/// every exchange first discards whatever is already pending. A reply that
/// lands during the next exchange can still be mistaken for that exchange's
/// answer.
pub struct PipeBinding {
    prefix: PathBuf,
    frame: FrameConfig,
    fifo: Option<Fifo>,
    commands: Option<CommandWriter<ChildStdin>>,
    responses: Option<FrameReader<WorkerStream>>,
}

impl PipeBinding {
    pub fn new(prefix: PathBuf, frame: FrameConfig) -> Self {
        Self {
            prefix,
            frame,
            fifo: None,
            commands: None,
            responses: None,
        }
    }

    /// The FIFO path, once prepared.
    pub fn path(&self) -> Option<&std::path::Path> {
        self.fifo.as_ref().map(Fifo::path)
    }

    fn discard_pending(responses: &mut FrameReader<WorkerStream>) {
        let mut stale = responses.buffered();
        responses.clear();
        let mut chunk = [0u8; 8192];
        loop {
            match responses.get_mut().read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => stale += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        if stale > 0 {
            warn!(bytes = stale, "discarded late response left in the fifo");
        }
    }
}

impl TransportBinding for PipeBinding {
    fn kind(&self) -> TransportKind {
        TransportKind::Pipe
    }

    fn launch_args(&self) -> Vec<String> {
        match &self.fifo {
            Some(fifo) => vec![
                "--outpipe".to_string(),
                fifo.path().to_string_lossy().into_owned(),
            ],
            None => Vec::new(),
        }
    }

    fn needs_stdin(&self) -> bool {
        true
    }

    fn reconnects_per_call(&self) -> bool {
        false
    }

    fn prepare(&mut self) -> Result<()> {
        if self.fifo.is_none() {
            self.fifo = Some(Fifo::create(Fifo::unique_path(&self.prefix))?);
        }
        Ok(())
    }

    fn attach(&mut self, stdin: Option<ChildStdin>) -> Result<()> {
        let stdin = stdin.ok_or_else(|| {
            WorkerError::Config("pipe transport needs the worker's stdin".to_string())
        })?;
        let fifo = self
            .fifo
            .as_ref()
            .ok_or_else(|| WorkerError::Config("pipe transport was not prepared".to_string()))?;
        self.responses = Some(FrameReader::with_config(
            fifo.open_reader()?,
            self.frame.clone(),
        ));
        self.commands = Some(CommandWriter::new(stdin));
        Ok(())
    }

    fn exchange(
        &mut self,
        verb: &str,
        argument_json: &str,
        deadline: Instant,
        alive: &mut dyn FnMut() -> bool,
    ) -> std::result::Result<Bytes, ExchangeError> {
        let (Some(commands), Some(responses)) = (self.commands.as_mut(), self.responses.as_mut())
        else {
            return Err(ExchangeError::Closed);
        };

        Self::discard_pending(responses);

        commands
            .send(&[verb, argument_json])
            .map_err(|err| ExchangeError::from_frame(err, alive))?;

        match responses.read_frame_until(Some(deadline), alive) {
            Ok(frame) => {
                debug!(verb, len = frame.payload.len(), "pipe exchange complete");
                Ok(frame.payload)
            }
            Err(err) => {
                let err = ExchangeError::from_frame(err, alive);
                if matches!(err, ExchangeError::TimedOut(_)) {
                    warn!(
                        verb,
                        "pipe read timed out; a late reply may still arrive on the fifo"
                    );
                }
                Err(err)
            }
        }
    }

    fn detach(&mut self) {
        self.commands = None;
        self.responses = None;
    }

    fn cleanup(&mut self) {
        self.detach();
        if let Some(mut fifo) = self.fifo.take() {
            fifo.remove();
        }
    }

    fn owned_paths(&self) -> Vec<PathBuf> {
        self.fifo
            .iter()
            .map(|fifo| fifo.path().to_path_buf())
            .collect()
    }
}

impl Drop for PipeBinding {
    fn drop(&mut self) {
        self.cleanup();
    }
}
