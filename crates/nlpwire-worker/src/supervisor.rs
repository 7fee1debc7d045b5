use std::fmt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::binding::TransportBinding;
use crate::config::{LaunchCommand, WorkerOutput};
use crate::error::{Result, WorkerError};
use crate::handshake::{await_ready, HandshakeConfig, HandshakeResult};
use crate::reaper::{self, Ticket};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lifecycle state of the supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    NotStarted,
    Starting,
    Ready,
    Crashed,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerState::NotStarted => "not_started",
            WorkerState::Starting => "starting",
            WorkerState::Ready => "ready",
            WorkerState::Crashed => "crashed",
            WorkerState::Stopped => "stopped",
        })
    }
}

#[derive(Debug)]
struct WorkerProcess {
    child: Child,
    pid: u32,
    started_at: Instant,
    ticket: Ticket,
}

/// Owns at most one worker process and drives it through its lifecycle.
///
/// Dropping the supervisor kills the worker.
#[derive(Debug)]
pub struct Supervisor {
    launch: LaunchCommand,
    handshake: HandshakeConfig,
    output: WorkerOutput,
    state: WorkerState,
    process: Option<WorkerProcess>,
    failure: Option<String>,
    spawn_count: u32,
    last_handshake: Option<HandshakeResult>,
}

impl Supervisor {
    pub fn new(launch: LaunchCommand, handshake: HandshakeConfig, output: WorkerOutput) -> Self {
        Self {
            launch,
            handshake,
            output,
            state: WorkerState::NotStarted,
            process: None,
            failure: None,
            spawn_count: 0,
            last_handshake: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Pid of the current worker process, if one is running.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|process| process.pid)
    }

    /// Number of processes spawned over the supervisor's life.
    pub fn spawn_count(&self) -> u32 {
        self.spawn_count
    }

    /// Why the last (re)start failed, if it did.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn last_handshake(&self) -> Option<HandshakeResult> {
        self.last_handshake
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.process
            .as_ref()
            .map(|process| process.started_at.elapsed())
    }

    pub fn launch_command(&self) -> &LaunchCommand {
        &self.launch
    }

    /// Probe the process. An exit moves a live state to `Crashed`.
    pub fn is_alive(&mut self) -> bool {
        let Some(process) = self.process.as_mut() else {
            return false;
        };
        match process.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                if matches!(self.state, WorkerState::Starting | WorkerState::Ready) {
                    warn!(pid = process.pid, %status, "worker exited");
                    self.state = WorkerState::Crashed;
                }
                false
            }
            Err(err) => {
                warn!(pid = process.pid, error = %err, "failed to poll worker status");
                self.state = WorkerState::Crashed;
                false
            }
        }
    }

    /// Exit status of the current process, if it has exited.
    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        self.process
            .as_mut()
            .and_then(|process| process.child.try_wait().ok().flatten())
    }

    /// Wait up to `grace` for the process to exit. True if it did.
    pub fn wait_for_exit(&mut self, grace: Duration) -> bool {
        let until = Instant::now() + grace;
        loop {
            if !self.is_alive() {
                return true;
            }
            if Instant::now() >= until {
                return false;
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    /// Kill any current worker, spawn a fresh one and wait for its PONG.
    ///
    /// Failure is fatal: the process is killed and
    /// [`ensure_running`](Self::ensure_running) refuses to spawn again.
    pub fn start(&mut self, binding: &mut dyn TransportBinding) -> Result<HandshakeResult> {
        match self.try_start(binding) {
            Ok(result) => {
                self.failure = None;
                Ok(result)
            }
            Err(err) => {
                warn!(error = %err, "worker start failed");
                self.kill();
                binding.detach();
                self.failure = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn try_start(&mut self, binding: &mut dyn TransportBinding) -> Result<HandshakeResult> {
        self.kill();
        binding.detach();
        binding.prepare()?;

        let mut command = Command::new(&self.launch.program);
        command
            .args(&self.launch.args)
            .args(binding.launch_args())
            .stdin(if binding.needs_stdin() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        match self.output {
            WorkerOutput::Inherit => command.stdout(Stdio::inherit()).stderr(Stdio::inherit()),
            WorkerOutput::Null => command.stdout(Stdio::null()).stderr(Stdio::null()),
        };

        let mut child = command.spawn().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                WorkerError::MissingResource(self.launch.program.clone())
            } else {
                WorkerError::Spawn(err)
            }
        })?;
        let pid = child.id();
        let stdin = child.stdin.take();
        self.spawn_count += 1;
        info!(
            pid,
            program = %self.launch.program.display(),
            transport = %binding.kind(),
            "spawned worker"
        );

        let ticket = reaper::register(pid, binding.owned_paths());
        self.process = Some(WorkerProcess {
            child,
            pid,
            started_at: Instant::now(),
            ticket,
        });
        self.state = WorkerState::Starting;

        binding.attach(stdin)?;

        let handshake = self.handshake.clone();
        let outcome = {
            let mut alive = || self.is_alive();
            await_ready(binding, &handshake, &mut alive)
        };
        let result = match outcome {
            Ok(result) => result,
            Err(WorkerError::StartupCrashed(None)) => {
                let status = self.exit_status().map(|status| status.to_string());
                return Err(WorkerError::StartupCrashed(status));
            }
            Err(err) => return Err(err),
        };

        self.state = WorkerState::Ready;
        self.last_handshake = Some(result);
        info!(pid, attempts = result.attempts, "worker ready for requests");
        Ok(result)
    }

    /// Make sure a ready worker is running, starting one if needed.
    ///
    /// Returns the handshake result when a (re)start happened.
    pub fn ensure_running(
        &mut self,
        binding: &mut dyn TransportBinding,
    ) -> Result<Option<HandshakeResult>> {
        if let Some(reason) = &self.failure {
            return Err(WorkerError::Unavailable(reason.clone()));
        }
        let state = self.state;
        match state {
            WorkerState::Ready if self.is_alive() => Ok(None),
            WorkerState::NotStarted | WorkerState::Stopped => self.start(binding).map(Some),
            _ => {
                warn!(pid = ?self.pid(), "worker is not running; restarting");
                self.start(binding).map(Some)
            }
        }
    }

    /// Force-terminate the worker and reap it. Safe to call repeatedly.
    pub fn kill(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        reaper::unregister(process.ticket);
        let pid = process.pid;

        match process.child.try_wait() {
            Ok(Some(status)) => info!(pid, %status, "worker already exited"),
            _ => {
                if let Err(err) = process.child.kill() {
                    warn!(pid, error = %err, "failed to kill worker");
                }
                match process.child.wait() {
                    Ok(status) => info!(pid, %status, "worker killed"),
                    Err(err) => warn!(pid, error = %err, "failed to reap worker"),
                }
            }
        }
        self.state = WorkerState::Stopped;
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;
    use std::process::ChildStdin;

    use bytes::Bytes;

    use super::*;
    use crate::binding::ExchangeError;
    use crate::config::TransportKind;

    /// Answers PONG while the process is alive; never touches the process.
    #[derive(Default)]
    struct LoopbackBinding {
        prepared: u32,
        attached: u32,
        detached: u32,
    }

    impl TransportBinding for LoopbackBinding {
        fn kind(&self) -> TransportKind {
            TransportKind::Socket
        }
        fn launch_args(&self) -> Vec<String> {
            vec!["--server".to_string(), "0".to_string()]
        }
        fn needs_stdin(&self) -> bool {
            false
        }
        fn reconnects_per_call(&self) -> bool {
            true
        }
        fn prepare(&mut self) -> Result<()> {
            self.prepared += 1;
            Ok(())
        }
        fn attach(&mut self, stdin: Option<ChildStdin>) -> Result<()> {
            assert!(stdin.is_none());
            self.attached += 1;
            Ok(())
        }
        fn exchange(
            &mut self,
            _verb: &str,
            _argument_json: &str,
            _deadline: Instant,
            alive: &mut dyn FnMut() -> bool,
        ) -> std::result::Result<Bytes, ExchangeError> {
            std::thread::sleep(Duration::from_millis(20));
            if alive() {
                Ok(Bytes::from_static(br#""PONG""#))
            } else {
                Err(ExchangeError::Crashed)
            }
        }
        fn detach(&mut self) {
            self.detached += 1;
        }
        fn cleanup(&mut self) {}
        fn owned_paths(&self) -> Vec<PathBuf> {
            Vec::new()
        }
    }

    fn shell(script: &str) -> LaunchCommand {
        LaunchCommand {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    fn supervisor(script: &str) -> Supervisor {
        let handshake = HandshakeConfig {
            startup_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(10),
            attempt_timeout: Duration::from_millis(200),
        };
        Supervisor::new(shell(script), handshake, WorkerOutput::Null)
    }

    fn pid_alive(pid: u32) -> bool {
        // SAFETY: signal 0 only checks for existence.
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    #[test]
    fn start_reaches_ready() {
        let mut supervisor = supervisor("sleep 30");
        let mut binding = LoopbackBinding::default();
        assert_eq!(supervisor.state(), WorkerState::NotStarted);

        let result = supervisor.start(&mut binding).unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(supervisor.state(), WorkerState::Ready);
        assert!(supervisor.pid().is_some());
        assert_eq!(supervisor.spawn_count(), 1);
        assert_eq!(binding.attached, 1);
    }

    #[test]
    fn restart_while_ready_replaces_the_process() {
        let mut supervisor = supervisor("sleep 30");
        let mut binding = LoopbackBinding::default();
        supervisor.start(&mut binding).unwrap();
        let first = supervisor.pid().unwrap();

        supervisor.start(&mut binding).unwrap();
        let second = supervisor.pid().unwrap();
        assert_ne!(first, second);
        assert!(!pid_alive(first));
        assert!(pid_alive(second));
        assert_eq!(supervisor.spawn_count(), 2);
        assert!(binding.detached >= 2);
    }

    #[test]
    fn ensure_running_restarts_after_exit() {
        let mut supervisor = supervisor("sleep 1");
        let mut binding = LoopbackBinding::default();
        assert!(supervisor.ensure_running(&mut binding).unwrap().is_some());
        assert!(supervisor.ensure_running(&mut binding).unwrap().is_none());

        assert!(supervisor.wait_for_exit(Duration::from_secs(5)));
        assert_eq!(supervisor.state(), WorkerState::Crashed);
        assert!(supervisor.ensure_running(&mut binding).unwrap().is_some());
        assert_eq!(supervisor.state(), WorkerState::Ready);
        assert_eq!(supervisor.spawn_count(), 2);
    }

    #[test]
    fn kill_is_idempotent() {
        let mut supervisor = supervisor("sleep 30");
        let mut binding = LoopbackBinding::default();
        supervisor.start(&mut binding).unwrap();
        let pid = supervisor.pid().unwrap();

        supervisor.kill();
        supervisor.kill();
        assert_eq!(supervisor.state(), WorkerState::Stopped);
        assert!(supervisor.pid().is_none());
        assert!(!pid_alive(pid));
    }

    #[test]
    fn exit_during_startup_is_fatal() {
        let mut supervisor = supervisor("exit 3");
        let mut binding = LoopbackBinding::default();

        let err = supervisor.start(&mut binding).unwrap_err();
        assert!(matches!(err, WorkerError::StartupCrashed(_)));
        assert!(supervisor.failure().is_some());
        assert!(supervisor.pid().is_none());

        let err = supervisor.ensure_running(&mut binding).unwrap_err();
        assert!(matches!(err, WorkerError::Unavailable(_)));
        assert_eq!(supervisor.spawn_count(), 1);
    }

    #[test]
    fn missing_program_is_a_missing_resource() {
        let mut supervisor = Supervisor::new(
            LaunchCommand {
                program: PathBuf::from("nlpwire-no-such-engine"),
                args: Vec::new(),
            },
            HandshakeConfig::default(),
            WorkerOutput::Null,
        );
        let mut binding = LoopbackBinding::default();
        let err = supervisor.start(&mut binding).unwrap_err();
        assert!(matches!(err, WorkerError::MissingResource(_)));
        assert_eq!(supervisor.spawn_count(), 0);
    }
}
