#![allow(dead_code)]

use std::net::{Ipv4Addr, TcpListener};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nlpwire_worker::{ClientConfig, Launcher, TransportKind, WorkerOutput};
use tempfile::TempDir;

pub const ALL_TRANSPORTS: [TransportKind; 3] = [
    TransportKind::Socket,
    TransportKind::Pipe,
    TransportKind::Sentinel,
];

pub fn free_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// A config that launches the mock engine in `ssplit` mode with fast polling.
///
/// The returned directory holds the FIFO; keep it alive as long as the client.
pub fn mock_config(kind: TransportKind, settings: &[(&str, &str)]) -> (ClientConfig, TempDir) {
    let dir = tempfile::tempdir().expect("scratch dir");
    let mut config = ClientConfig::default();

    config.engine.launcher = Launcher::Executable {
        program: PathBuf::from(env!("CARGO_BIN_EXE_nlpwire-mock-engine")),
        args: Vec::new(),
    };
    config.engine.mode = Some("ssplit".to_string());
    for (key, value) in settings {
        config
            .engine
            .settings
            .insert((*key).to_string(), (*value).to_string());
    }

    config.transport.kind = kind;
    config.transport.port = free_port();
    config.transport.pipe_prefix = dir.path().join("pipe");
    config.transport.connect_attempts = 50;
    config.transport.connect_backoff = Duration::from_millis(20);

    config.handshake.startup_timeout = Duration::from_secs(20);
    config.handshake.retry_interval = Duration::from_millis(50);
    config.handshake.attempt_timeout = Duration::from_secs(1);

    config.frame.poll_interval = Duration::from_millis(2);
    config.policy.default_timeout = Duration::from_secs(20);
    config.worker_output = WorkerOutput::Null;

    (config, dir)
}

#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs only the existence and permission check.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Entries in `dir` whose names start with `prefix`.
pub fn entries_with_prefix(dir: &Path, prefix: &str) -> usize {
    std::fs::read_dir(dir)
        .expect("read scratch dir")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .count()
}
