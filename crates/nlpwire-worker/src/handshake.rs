use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::binding::{ExchangeError, TransportBinding};
use crate::config::duration_ms;
use crate::error::{Result, WorkerError};
use crate::protocol::{encode_argument, is_pong, Verb};

/// Timing for the startup PING loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Hard ceiling for the whole handshake.
    #[serde(with = "duration_ms")]
    pub startup_timeout: Duration,
    /// Pause after a refused or unusable attempt.
    #[serde(with = "duration_ms")]
    pub retry_interval: Duration,
    /// Budget for one PING on bindings that reconnect per call. Bindings
    /// with a persistent channel send a single PING bounded by the ceiling.
    #[serde(with = "duration_ms")]
    pub attempt_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(5 * 60),
            retry_interval: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(2),
        }
    }
}

/// Result of a successful handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeResult {
    /// PING attempts made, including the one that got PONG.
    pub attempts: u32,
    /// Time from the first attempt to PONG.
    pub elapsed: Duration,
}

/// PING the worker until it answers `"PONG"`.
///
/// Refused connections, closed channels, undecodable replies and per-attempt
/// timeouts all mean "not ready yet". A decoded reply other than `"PONG"` is
/// a protocol mismatch, and a worker that exits fails the handshake at once.
pub fn await_ready(
    binding: &mut dyn TransportBinding,
    config: &HandshakeConfig,
    alive: &mut dyn FnMut() -> bool,
) -> Result<HandshakeResult> {
    let started = Instant::now();
    let ceiling = started + config.startup_timeout;
    let argument = encode_argument("");
    let mut attempts = 0u32;

    loop {
        if !alive() {
            return Err(WorkerError::StartupCrashed(None));
        }
        let now = Instant::now();
        if now >= ceiling {
            return Err(WorkerError::HandshakeTimeout(config.startup_timeout));
        }

        attempts += 1;
        let deadline = if binding.reconnects_per_call() {
            (now + config.attempt_timeout).min(ceiling)
        } else {
            ceiling
        };

        let not_ready = match binding.exchange(Verb::Ping.as_str(), &argument, deadline, alive) {
            Ok(payload) => match serde_json::from_slice::<Value>(&payload) {
                Ok(value) if is_pong(&value) => {
                    let elapsed = started.elapsed();
                    info!(attempts, elapsed_ms = elapsed.as_millis() as u64, "worker ready");
                    return Ok(HandshakeResult { attempts, elapsed });
                }
                Ok(value) => return Err(WorkerError::ProtocolMismatch(value.to_string())),
                Err(err) => format!("undecodable reply: {err}"),
            },
            Err(ExchangeError::Crashed) => return Err(WorkerError::StartupCrashed(None)),
            Err(ExchangeError::TimedOut(elapsed)) => {
                debug!(attempt = attempts, ?elapsed, "startup ping timed out");
                continue;
            }
            Err(err) => err.to_string(),
        };

        debug!(attempt = attempts, reason = %not_ready, "worker not ready yet");
        let pause = config
            .retry_interval
            .min(ceiling.saturating_duration_since(Instant::now()));
        std::thread::sleep(pause);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::process::ChildStdin;

    use bytes::Bytes;
    use nlpwire_frame::FrameError;

    use super::*;
    use crate::config::TransportKind;

    enum Reply {
        Payload(&'static [u8]),
        Refused,
        Closed,
        Timeout,
        Crash,
    }

    /// Replays canned replies and records the deadlines it was given.
    struct ScriptedBinding {
        replies: VecDeque<Reply>,
        reconnects: bool,
        deadlines: Vec<Instant>,
    }

    impl ScriptedBinding {
        fn new(replies: Vec<Reply>, reconnects: bool) -> Self {
            Self {
                replies: replies.into(),
                reconnects,
                deadlines: Vec::new(),
            }
        }
    }

    impl TransportBinding for ScriptedBinding {
        fn kind(&self) -> TransportKind {
            TransportKind::Socket
        }
        fn launch_args(&self) -> Vec<String> {
            Vec::new()
        }
        fn needs_stdin(&self) -> bool {
            false
        }
        fn reconnects_per_call(&self) -> bool {
            self.reconnects
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
            _alive: &mut dyn FnMut() -> bool,
        ) -> std::result::Result<Bytes, ExchangeError> {
            assert_eq!(verb, "PING");
            assert_eq!(argument_json, "\"\"");
            self.deadlines.push(deadline);
            match self.replies.pop_front() {
                Some(Reply::Payload(bytes)) => Ok(Bytes::from_static(bytes)),
                Some(Reply::Refused) => Err(ExchangeError::Refused(
                    nlpwire_transport::TransportError::Io(std::io::Error::from(
                        std::io::ErrorKind::ConnectionRefused,
                    )),
                )),
                Some(Reply::Closed) => Err(ExchangeError::Closed),
                Some(Reply::Timeout) | None => Err(ExchangeError::TimedOut(Duration::ZERO)),
                Some(Reply::Crash) => Err(ExchangeError::Crashed),
            }
        }
        fn detach(&mut self) {}
        fn cleanup(&mut self) {}
        fn owned_paths(&self) -> Vec<PathBuf> {
            Vec::new()
        }
    }

    fn fast_config() -> HandshakeConfig {
        HandshakeConfig {
            startup_timeout: Duration::from_millis(500),
            retry_interval: Duration::from_millis(5),
            attempt_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn not_ready_replies_are_retried_until_pong() {
        let mut binding = ScriptedBinding::new(
            vec![
                Reply::Refused,
                Reply::Closed,
                Reply::Timeout,
                Reply::Payload(b"{garbage"),
                Reply::Payload(br#""PONG""#),
            ],
            true,
        );
        let result = await_ready(&mut binding, &fast_config(), &mut || true).unwrap();
        assert_eq!(result.attempts, 5);
    }

    #[test]
    fn wrong_reply_is_a_protocol_mismatch() {
        let mut binding = ScriptedBinding::new(vec![Reply::Payload(br#""HELLO""#)], true);
        let err = await_ready(&mut binding, &fast_config(), &mut || true).unwrap_err();
        assert!(matches!(err, WorkerError::ProtocolMismatch(ref got) if got == "\"HELLO\""));
    }

    #[test]
    fn null_reply_is_a_protocol_mismatch() {
        let mut binding = ScriptedBinding::new(vec![Reply::Payload(b"null")], true);
        let err = await_ready(&mut binding, &fast_config(), &mut || true).unwrap_err();
        assert!(matches!(err, WorkerError::ProtocolMismatch(_)));
    }

    #[test]
    fn crash_during_handshake_is_fatal() {
        let mut binding = ScriptedBinding::new(vec![Reply::Refused, Reply::Crash], true);
        let err = await_ready(&mut binding, &fast_config(), &mut || true).unwrap_err();
        assert!(matches!(err, WorkerError::StartupCrashed(_)));
    }

    #[test]
    fn dead_worker_fails_before_any_ping() {
        let mut binding = ScriptedBinding::new(vec![], true);
        let err = await_ready(&mut binding, &fast_config(), &mut || false).unwrap_err();
        assert!(matches!(err, WorkerError::StartupCrashed(_)));
        assert!(binding.deadlines.is_empty());
    }

    #[test]
    fn silent_worker_hits_the_ceiling() {
        let mut binding = SilentBinding;
        let config = HandshakeConfig {
            startup_timeout: Duration::from_millis(100),
            ..fast_config()
        };
        let err = await_ready(&mut binding, &config, &mut || true).unwrap_err();
        assert!(matches!(err, WorkerError::HandshakeTimeout(_)));
    }

    #[test]
    fn persistent_channel_waits_out_the_ceiling_once() {
        let mut binding = ScriptedBinding::new(vec![Reply::Payload(br#""PONG""#)], false);
        let config = fast_config();
        let before = Instant::now();
        await_ready(&mut binding, &config, &mut || true).unwrap();
        assert_eq!(binding.deadlines.len(), 1);
        assert!(binding.deadlines[0] >= before + config.startup_timeout);
    }

    #[test]
    fn reconnecting_channel_bounds_each_attempt() {
        let mut binding = ScriptedBinding::new(vec![Reply::Payload(br#""PONG""#)], true);
        let config = fast_config();
        let after = Instant::now() + config.attempt_timeout;
        await_ready(&mut binding, &config, &mut || true).unwrap();
        assert!(binding.deadlines[0] <= after + Duration::from_millis(50));
    }

    /// Sleeps until the deadline, like a worker that never answers.
    struct SilentBinding;

    impl TransportBinding for SilentBinding {
        fn kind(&self) -> TransportKind {
            TransportKind::Pipe
        }
        fn launch_args(&self) -> Vec<String> {
            Vec::new()
        }
        fn needs_stdin(&self) -> bool {
            true
        }
        fn reconnects_per_call(&self) -> bool {
            false
        }
        fn prepare(&mut self) -> Result<()> {
            Ok(())
        }
        fn attach(&mut self, _stdin: Option<ChildStdin>) -> Result<()> {
            Ok(())
        }
        fn exchange(
            &mut self,
            _verb: &str,
            _argument_json: &str,
            deadline: Instant,
            _alive: &mut dyn FnMut() -> bool,
        ) -> std::result::Result<Bytes, ExchangeError> {
            std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
            Err(ExchangeError::Protocol(FrameError::TimedOut(Duration::ZERO)))
        }
        fn detach(&mut self) {}
        fn cleanup(&mut self) {}
        fn owned_paths(&self) -> Vec<PathBuf> {
            Vec::new()
        }
    }
}
