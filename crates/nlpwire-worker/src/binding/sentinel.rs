use std::path::PathBuf;
use std::process::ChildStdin;
use std::time::Instant;

use bytes::Bytes;
use nlpwire_frame::{read_sentinel, CommandWriter, FrameConfig, FrameError};
use tempfile::TempDir;
use tracing::{debug, warn};

use super::{ExchangeError, TransportBinding};
use crate::config::TransportKind;
use crate::error::{Result, WorkerError};

const SCRATCH_PREFIX: &str = "nlpwire_sentinel";

/// Commands on the worker's stdin, each naming a fresh response file.
///
/// Request lines carry an extra field, `VERB\t<response path>\t<json>`. The
/// worker writes the payload into that file and terminates it with a NUL
/// byte. Response files live in a scratch directory owned by the binding, so
/// a reply to a timed-out call never reaches a later one.
pub struct SentinelBinding {
    frame: FrameConfig,
    scratch: Option<TempDir>,
    commands: Option<CommandWriter<ChildStdin>>,
}

impl SentinelBinding {
    pub fn new(frame: FrameConfig) -> Self {
        Self {
            frame,
            scratch: None,
            commands: None,
        }
    }
}

impl TransportBinding for SentinelBinding {
    fn kind(&self) -> TransportKind {
        TransportKind::Sentinel
    }

    fn launch_args(&self) -> Vec<String> {
        vec!["--sentinel".to_string()]
    }

    fn needs_stdin(&self) -> bool {
        true
    }

    fn reconnects_per_call(&self) -> bool {
        true
    }

    fn prepare(&mut self) -> Result<()> {
        if self.scratch.is_none() {
            let scratch = tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir()?;
            debug!(path = ?scratch.path(), "created sentinel scratch directory");
            self.scratch = Some(scratch);
        }
        Ok(())
    }

    fn attach(&mut self, stdin: Option<ChildStdin>) -> Result<()> {
        let stdin = stdin.ok_or_else(|| {
            WorkerError::Config("sentinel transport needs the worker's stdin".to_string())
        })?;
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
        let (Some(commands), Some(scratch)) = (self.commands.as_mut(), self.scratch.as_ref())
        else {
            return Err(ExchangeError::Closed);
        };

        let response = tempfile::Builder::new()
            .prefix("response")
            .tempfile_in(scratch.path())
            .map_err(|err| ExchangeError::Protocol(FrameError::Io(err)))?
            .into_temp_path();
        let response_path = response.to_string_lossy().into_owned();

        commands
            .send(&[verb, response_path.as_str(), argument_json])
            .map_err(|err| ExchangeError::from_frame(err, alive))?;

        let payload = read_sentinel(&response, &self.frame, Some(deadline), alive)
            .map_err(|err| ExchangeError::from_frame(err, alive))?;
        debug!(verb, len = payload.len(), "sentinel exchange complete");
        Ok(payload)
    }

    fn detach(&mut self) {
        self.commands = None;
    }

    fn cleanup(&mut self) {
        self.detach();
        if let Some(scratch) = self.scratch.take() {
            let path = scratch.path().to_path_buf();
            if let Err(err) = scratch.close() {
                warn!(?path, error = %err, "failed to remove sentinel scratch directory");
            }
        }
    }

    fn owned_paths(&self) -> Vec<PathBuf> {
        self.scratch
            .iter()
            .map(|scratch| scratch.path().to_path_buf())
            .collect()
    }
}

impl Drop for SentinelBinding {
    fn drop(&mut self) {
        self.cleanup();
    }
}
