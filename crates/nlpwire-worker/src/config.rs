use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nlpwire_frame::FrameConfig;
use nlpwire_transport::ConnectRetry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Result, WorkerError};
use crate::handshake::HandshakeConfig;
use crate::modes::find_mode;

/// Default timeout for a `PARSEDOC` call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default number of crash-triggered restarts per call before giving up.
pub const DEFAULT_RETRY_CEILING: u32 = 2;

/// Everything needed to build a [`Client`](crate::Client).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub engine: EngineConfig,
    pub transport: TransportConfig,
    pub handshake: HandshakeConfig,
    pub frame: FrameSettings,
    pub policy: CallPolicy,
    pub worker_output: WorkerOutput,
}

/// Per-call timeout and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallPolicy {
    /// Consecutive crash-triggered restarts before a call returns null.
    pub retry_ceiling: u32,
    /// Timeout used by the convenience calls that take none.
    #[serde(with = "duration_ms")]
    pub default_timeout: Duration,
    /// How long to wait for an exit status after the socket closes mid-call.
    #[serde(with = "duration_ms")]
    pub exit_grace: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            retry_ceiling: DEFAULT_RETRY_CEILING,
            default_timeout: DEFAULT_CALL_TIMEOUT,
            exit_grace: Duration::from_millis(500),
        }
    }
}

/// Where the worker's own stdout/stderr go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerOutput {
    #[default]
    Inherit,
    Null,
}

/// Which channel carries responses back from the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Loopback TCP, one connection per call.
    Socket,
    /// Commands on stdin, responses through a named FIFO.
    #[default]
    Pipe,
    /// Commands on stdin, responses in NUL-terminated temp files.
    Sentinel,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Socket => "socket",
            TransportKind::Pipe => "pipe",
            TransportKind::Sentinel => "sentinel",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// Loopback port for the socket transport. Must differ between clients.
    pub port: u16,
    /// Path prefix for the response FIFO; a unique suffix is appended.
    pub pipe_prefix: PathBuf,
    /// Connect attempts per call for the socket transport.
    pub connect_attempts: u32,
    #[serde(with = "duration_ms")]
    pub connect_backoff: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        let retry = ConnectRetry::default();
        Self {
            kind: TransportKind::default(),
            port: 12340,
            pipe_prefix: std::env::temp_dir().join("nlpwire_pipe"),
            connect_attempts: retry.attempts,
            connect_backoff: retry.backoff,
        }
    }
}

impl TransportConfig {
    pub fn connect_retry(&self) -> ConnectRetry {
        ConnectRetry {
            attempts: self.connect_attempts,
            backoff: self.connect_backoff,
        }
    }
}

/// Serializable mirror of [`FrameConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub max_payload_size: usize,
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    pub idle_poll_budget: u32,
}

impl Default for FrameSettings {
    fn default() -> Self {
        let frame = FrameConfig::default();
        Self {
            max_payload_size: frame.max_payload_size,
            poll_interval: frame.poll_interval,
            idle_poll_budget: frame.idle_poll_budget,
        }
    }
}

impl FrameSettings {
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            poll_interval: self.poll_interval,
            idle_poll_budget: self.idle_poll_budget,
        }
    }
}

/// How to run the engine and which annotators it should load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub launcher: Launcher,
    /// Named mode from [`MODES`](crate::MODES); sets `annotators`.
    pub mode: Option<String>,
    /// Engine properties file passed through as `--configfile`.
    pub configfile: Option<PathBuf>,
    /// Engine properties passed through as `--configdict`.
    pub configdict: Option<Map<String, Value>>,
    /// Extra properties merged into `configdict`.
    pub settings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Launcher {
    /// Launch the engine on a JVM.
    Java(JavaLauncher),
    /// Launch a program that already speaks the protocol.
    Executable {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Default for Launcher {
    fn default() -> Self {
        Launcher::Java(JavaLauncher::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JavaLauncher {
    pub java_command: PathBuf,
    /// Maximum heap, as given to `-Xmx`.
    pub heap_size: String,
    pub gc_threads: u32,
    /// Additional JVM options, placed before the classpath.
    pub jvm_options: Vec<String>,
    /// Engine jars or `dir/*` wildcards; at least one must exist.
    pub engine_jars: Vec<String>,
    /// Directory of support jars bundled with the server class.
    pub support_lib_dir: Option<PathBuf>,
    pub main_class: String,
}

impl Default for JavaLauncher {
    fn default() -> Self {
        Self {
            java_command: PathBuf::from("java"),
            heap_size: "4g".to_string(),
            gc_threads: 1,
            jvm_options: Vec::new(),
            engine_jars: Vec::new(),
            support_lib_dir: None,
            main_class: "corenlp.SocketServer".to_string(),
        }
    }
}

impl JavaLauncher {
    /// The `-cp` value: support libraries first, then the engine jars.
    pub fn classpath(&self) -> String {
        let mut entries = Vec::with_capacity(self.engine_jars.len() + 1);
        if let Some(dir) = &self.support_lib_dir {
            entries.push(dir.join("*").to_string_lossy().into_owned());
        }
        entries.extend(self.engine_jars.iter().cloned());
        entries.join(":")
    }

    fn verify_jars(&self) -> Result<()> {
        if self.engine_jars.is_empty() {
            return Err(WorkerError::Config(
                "no engine jars configured".to_string(),
            ));
        }
        let found = self.engine_jars.iter().any(|pattern| match glob::glob(pattern) {
            Ok(paths) => paths.flatten().any(|path| path.exists()),
            Err(_) => Path::new(pattern).exists(),
        });
        if found {
            Ok(())
        } else {
            Err(WorkerError::MissingJars(self.engine_jars.clone()))
        }
    }
}

/// A fully resolved program and argument list, minus transport flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{arg}'")
    }
}

impl EngineConfig {
    /// Validate the configuration and resolve the launch command.
    ///
    /// Fails before anything is spawned when the engine installation is
    /// missing or the annotator settings conflict.
    pub fn launch_command(&self) -> Result<LaunchCommand> {
        let mut command = match &self.launcher {
            Launcher::Java(java) => {
                java.verify_jars()?;
                let mut args = vec![
                    format!("-Xmx{}", java.heap_size),
                    format!("-XX:ParallelGCThreads={}", java.gc_threads),
                ];
                args.extend(java.jvm_options.iter().cloned());
                args.push("-cp".to_string());
                args.push(java.classpath());
                args.push(java.main_class.clone());
                LaunchCommand {
                    program: java.java_command.clone(),
                    args,
                }
            }
            Launcher::Executable { program, args } => {
                if program.components().count() > 1 && !program.exists() {
                    return Err(WorkerError::MissingResource(program.clone()));
                }
                LaunchCommand {
                    program: program.clone(),
                    args: args.clone(),
                }
            }
        };

        command.args.extend(self.annotation_args()?);
        Ok(command)
    }

    /// `--configfile` / `--configdict` flags for the engine.
    pub fn annotation_args(&self) -> Result<Vec<String>> {
        let mut dict = self.configdict.clone().unwrap_or_default();
        for (key, value) in &self.settings {
            dict.insert(key.clone(), Value::String(value.clone()));
        }

        if self.mode.is_none() && self.configfile.is_none() && dict.is_empty() {
            return Err(WorkerError::Config(
                "set a mode, or the annotators directly via configfile or configdict".to_string(),
            ));
        }

        if let Some(name) = &self.mode {
            let mode = find_mode(name)
                .ok_or_else(|| WorkerError::Config(format!("unknown mode '{name}'")))?;
            if dict.contains_key("annotators") {
                return Err(WorkerError::Config(
                    "mode was given but annotators are set in the configdict; use only one"
                        .to_string(),
                ));
            }
            info!(mode = name.as_str(), annotators = mode.annotators, "setting annotators from mode");
            dict.insert(
                "annotators".to_string(),
                Value::String(mode.annotators.to_string()),
            );
        }

        let mut args = Vec::new();
        if let Some(path) = &self.configfile {
            args.push("--configfile".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        if !dict.is_empty() {
            let json = Value::Object(dict).to_string();
            if json.contains('\'') {
                return Err(WorkerError::Config(
                    "can't handle single quote in config values".to_string(),
                ));
            }
            args.push("--configdict".to_string());
            args.push(json);
        }
        Ok(args)
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
