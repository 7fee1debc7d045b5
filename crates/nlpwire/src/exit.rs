use std::fmt;
use std::io;

use nlpwire_worker::WorkerError;

// Exit codes follow sysexits where one fits.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const NO_INPUT: i32 = 66;
pub const UNAVAILABLE: i32 = 69;
pub const IO_ERROR: i32 = 74;
pub const CONFIG: i32 = 78;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
pub const INTERRUPTED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound => NO_INPUT,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::InvalidData => DATA_INVALID,
        _ => IO_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn worker_error(context: &str, err: WorkerError) -> CliError {
    let code = match &err {
        WorkerError::Config(_) => CONFIG,
        WorkerError::MissingResource(_) | WorkerError::MissingJars(_) => UNAVAILABLE,
        WorkerError::HandshakeTimeout(_) => TIMEOUT,
        WorkerError::ProtocolMismatch(_) => DATA_INVALID,
        WorkerError::StartupCrashed(_) | WorkerError::Unavailable(_) => UNAVAILABLE,
        WorkerError::Io(_) | WorkerError::Spawn(_) | WorkerError::Transport(_) => IO_ERROR,
        WorkerError::Frame(_) => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}
