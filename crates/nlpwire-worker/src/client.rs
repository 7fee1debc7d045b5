use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::binding::{binding_for, ExchangeError, TransportBinding};
use crate::config::{ClientConfig, TransportKind};
use crate::error::Result;
use crate::handshake::HandshakeResult;
use crate::protocol::{decode_payload, encode_argument, Response, Verb};
use crate::supervisor::{Supervisor, WorkerState};

/// Consecutive mid-call crashes, bounded by a ceiling.
///
/// A crash with the counter below the ceiling restarts the worker and
/// re-issues the call; at the ceiling the call gives up. Any clean read
/// resets the counter.
///
/// The ceiling counts restarts, not attempts: a call makes at most
/// `ceiling + 1` attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    consecutive: u32,
    ceiling: u32,
}

impl RetryState {
    pub fn new(ceiling: u32) -> Self {
        Self {
            consecutive: 0,
            ceiling,
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Record a crash. True if the caller may restart and retry.
    fn record_crash(&mut self) -> bool {
        if self.consecutive >= self.ceiling {
            return false;
        }
        self.consecutive += 1;
        true
    }

    fn reset(&mut self) {
        self.consecutive = 0;
    }
}

/// Synchronous RPC client for one supervised engine worker.
///
/// Construction validates the configuration, spawns the worker and waits for
/// its handshake; every failure there is returned as an error. After that,
/// calls never fail loudly: timeouts, bad payloads and exhausted restarts all
/// come back as [`Response::Null`].
///
/// Dropping the client kills the worker and removes transport files.
/// `std::process::exit` skips `Drop`, so a program that exits from a signal
/// handler or an exit hook should call [`reap_all`](crate::reaper::reap_all)
/// there first.
pub struct Client {
    config: ClientConfig,
    supervisor: Supervisor,
    binding: Box<dyn TransportBinding>,
    retry: RetryState,
}

impl Client {
    /// Validate `config`, start the worker and wait until it is ready.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let launch = config.engine.launch_command()?;
        info!(command = %launch, transport = %config.transport.kind, "starting engine");
        let binding = binding_for(&config)?;
        let supervisor = Supervisor::new(launch, config.handshake.clone(), config.worker_output);
        let retry = RetryState::new(config.policy.retry_ceiling);

        let mut client = Self {
            config,
            supervisor,
            binding,
            retry,
        };
        client.supervisor.start(client.binding.as_mut())?;
        Ok(client)
    }

    /// Run `f` with a ready client and tear the worker down afterwards.
    pub fn scoped<T>(config: ClientConfig, f: impl FnOnce(&mut Client) -> T) -> Result<T> {
        let mut client = Client::new(config)?;
        let output = f(&mut client);
        client.shutdown();
        Ok(output)
    }

    /// Send `verb` with `argument` and decode the JSON reply.
    pub fn call(&mut self, verb: Verb, argument: &str, timeout: Duration) -> Response {
        self.call_with(verb, argument, timeout, false)
    }

    /// Like [`call`](Self::call) but hands back the payload undecoded.
    pub fn call_raw(&mut self, verb: Verb, argument: &str, timeout: Duration) -> Response {
        self.call_with(verb, argument, timeout, true)
    }

    pub fn ping(&mut self) -> Response {
        let timeout = self.config.policy.default_timeout;
        self.call(Verb::Ping, "", timeout)
    }

    /// Annotate one document with the default timeout.
    pub fn parse_doc(&mut self, text: &str) -> Response {
        let timeout = self.config.policy.default_timeout;
        self.call(Verb::ParseDoc, text, timeout)
    }

    pub fn parse_doc_with_timeout(&mut self, text: &str, timeout: Duration) -> Response {
        self.call(Verb::ParseDoc, text, timeout)
    }

    /// Annotate one document and return the reply bytes as-is.
    pub fn parse_doc_raw(&mut self, text: &str, timeout: Duration) -> Response {
        self.call_raw(Verb::ParseDoc, text, timeout)
    }

    /// Kill the current worker and start a fresh one.
    pub fn restart(&mut self) -> Result<HandshakeResult> {
        self.supervisor.start(self.binding.as_mut())
    }

    /// Kill the worker and release transport resources. Idempotent.
    pub fn shutdown(&mut self) {
        self.supervisor.kill();
        self.binding.cleanup();
    }

    pub fn state(&self) -> WorkerState {
        self.supervisor.state()
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    /// Consecutive crash-triggered restarts since the last clean read.
    pub fn retry_count(&self) -> u32 {
        self.retry.consecutive()
    }

    /// Processes spawned so far, including the first.
    pub fn spawn_count(&self) -> u32 {
        self.supervisor.spawn_count()
    }

    pub fn transport(&self) -> TransportKind {
        self.binding.kind()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn call_with(&mut self, verb: Verb, argument: &str, timeout: Duration, raw: bool) -> Response {
        let argument_json = encode_argument(argument);
        let Client {
            config,
            supervisor,
            binding,
            retry,
        } = self;

        loop {
            if let Err(err) = supervisor.ensure_running(binding.as_mut()) {
                error!(%verb, error = %err, "worker unavailable");
                return Response::Fatal(err.to_string());
            }

            let deadline = Instant::now() + timeout;
            let outcome = {
                let mut alive = || supervisor.is_alive();
                binding.exchange(verb.as_str(), &argument_json, deadline, &mut alive)
            };

            let crashed = match outcome {
                Ok(payload) => {
                    retry.reset();
                    if raw {
                        return Response::Raw(payload);
                    }
                    return decode_payload(&payload).map_or(Response::Null, Response::Decoded);
                }
                Err(ExchangeError::Crashed) => true,
                Err(ExchangeError::Closed) => supervisor.wait_for_exit(config.policy.exit_grace),
                Err(ExchangeError::TimedOut(elapsed)) => {
                    warn!(
                        %verb,
                        pid = ?supervisor.pid(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "call timed out; returning null"
                    );
                    return Response::Null;
                }
                Err(err) => {
                    warn!(%verb, error = %err, "call failed; returning null");
                    return Response::Null;
                }
            };

            if !crashed {
                warn!(%verb, "channel closed with the worker still running; returning null");
                return Response::Null;
            }

            if !retry.record_crash() {
                warn!(
                    %verb,
                    retries = retry.consecutive(),
                    "worker crashed: too many retries, giving up"
                );
                return Response::Null;
            }

            warn!(
                %verb,
                retry = retry.consecutive(),
                ceiling = retry.ceiling(),
                "worker crashed; restarting and retrying the call"
            );
            if let Err(err) = supervisor.start(binding.as_mut()) {
                error!(%verb, error = %err, "restart after crash failed");
                return Response::Fatal(err.to_string());
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.binding.kind())
            .field("state", &self.supervisor.state())
            .field("pid", &self.supervisor.pid())
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_state_allows_exactly_ceiling_restarts() {
        let mut retry = RetryState::new(2);
        assert!(retry.record_crash());
        assert!(retry.record_crash());
        assert!(!retry.record_crash());
        assert_eq!(retry.consecutive(), 2);

        retry.reset();
        assert_eq!(retry.consecutive(), 0);
        assert!(retry.record_crash());
    }

    #[test]
    fn zero_ceiling_never_restarts() {
        let mut retry = RetryState::new(0);
        assert!(!retry.record_crash());
    }

    #[test]
    fn construction_fails_before_spawning_on_bad_config() {
        let config = ClientConfig::default();
        let err = Client::new(config).unwrap_err();
        assert!(matches!(err, crate::WorkerError::Config(_)));
    }
}
