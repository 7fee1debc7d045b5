use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use nlpwire_worker::{reaper, ClientConfig, JavaLauncher, Launcher, TransportKind, WorkerOutput};
use serde_json::{Map, Value};

use crate::exit::{io_error, CliError, CliResult, CONFIG, INTERNAL, INTERRUPTED, USAGE};
use crate::output::OutputFormat;

pub mod files;
pub mod lines;
pub mod modes;
pub mod ping;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the named annotation modes.
    Modes,
    /// Start a worker, confirm the handshake and print its pid.
    Ping,
    /// Annotate stdin, one document per line; print one JSON line each.
    Lines(LinesArgs),
    /// Annotate files, writing `<name>.anno` next to each.
    Files(FilesArgs),
}

pub fn run(command: Command, engine: &EngineArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Modes => modes::run(format),
        Command::Ping => ping::run(engine, format),
        Command::Lines(args) => lines::run(args, engine),
        Command::Files(args) => files::run(args, engine, format),
    }
}

#[derive(Args, Debug)]
pub struct LinesArgs {
    /// Per-document timeout (e.g. 30s, 500ms). Defaults to the config value.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct FilesArgs {
    /// Text files to annotate.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// Per-document timeout (e.g. 30s, 500ms). Defaults to the config value.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Socket,
    Pipe,
    Sentinel,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Socket => TransportKind::Socket,
            TransportArg::Pipe => TransportKind::Pipe,
            TransportArg::Sentinel => TransportKind::Sentinel,
        }
    }
}

/// Engine and transport options shared by every worker-backed command.
#[derive(Args, Debug, Default)]
pub struct EngineArgs {
    /// Load a serialized client configuration (JSON) before applying flags.
    #[arg(long, value_name = "FILE", env = "NLPWIRE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Named annotation mode (see `nlpwire modes`).
    #[arg(long, global = true)]
    pub mode: Option<String>,

    /// Engine properties file.
    #[arg(long, value_name = "PATH", global = true)]
    pub configfile: Option<PathBuf>,

    /// Engine properties as a JSON object.
    #[arg(long, value_name = "JSON", global = true)]
    pub configdict: Option<String>,

    /// Extra engine property, merged into the config dict (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    pub settings: Vec<String>,

    /// Response channel to the worker.
    #[arg(long, value_name = "KIND", global = true)]
    pub transport: Option<TransportArg>,

    /// Loopback port for the socket transport.
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Engine jar or `dir/*` wildcard (repeatable).
    #[arg(
        long = "jar",
        value_name = "PATH",
        env = "NLPWIRE_JARS",
        value_delimiter = ':',
        global = true
    )]
    pub jars: Vec<String>,

    /// Directory of support jars placed first on the classpath.
    #[arg(long, value_name = "DIR", global = true)]
    pub lib_dir: Option<PathBuf>,

    /// Java executable.
    #[arg(long, value_name = "PATH", global = true)]
    pub java: Option<PathBuf>,

    /// JVM maximum heap (e.g. 4g).
    #[arg(long, global = true)]
    pub heap: Option<String>,

    /// Run this program instead of a JVM.
    #[arg(
        long,
        value_name = "PATH",
        global = true,
        conflicts_with_all = ["java", "heap", "jars", "lib_dir"]
    )]
    pub engine_exe: Option<PathBuf>,

    /// Leading argument for `--engine-exe` (repeatable).
    #[arg(
        long = "engine-arg",
        value_name = "ARG",
        global = true,
        allow_hyphen_values = true
    )]
    pub engine_args: Vec<String>,

    /// Discard the worker's own stdout/stderr.
    #[arg(long, global = true)]
    pub quiet_worker: bool,
}

impl EngineArgs {
    /// Build the client configuration: file first, then flags on top.
    pub fn client_config(&self) -> CliResult<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|err| io_error(&format!("read {}", path.display()), err))?;
                serde_json::from_str(&raw).map_err(|err| {
                    CliError::new(CONFIG, format!("invalid config {}: {err}", path.display()))
                })?
            }
            None => ClientConfig::default(),
        };

        if let Some(exe) = &self.engine_exe {
            config.engine.launcher = Launcher::Executable {
                program: exe.clone(),
                args: self.engine_args.clone(),
            };
        } else if self.java.is_some()
            || self.heap.is_some()
            || !self.jars.is_empty()
            || self.lib_dir.is_some()
        {
            let mut java = match &config.engine.launcher {
                Launcher::Java(java) => java.clone(),
                Launcher::Executable { .. } => JavaLauncher::default(),
            };
            if let Some(command) = &self.java {
                java.java_command = command.clone();
            }
            if let Some(heap) = &self.heap {
                java.heap_size = heap.clone();
            }
            if !self.jars.is_empty() {
                java.engine_jars = self.jars.clone();
            }
            if let Some(dir) = &self.lib_dir {
                java.support_lib_dir = Some(dir.clone());
            }
            config.engine.launcher = Launcher::Java(java);
        }

        if let Some(mode) = &self.mode {
            config.engine.mode = Some(mode.clone());
        }
        if let Some(path) = &self.configfile {
            config.engine.configfile = Some(path.clone());
        }
        if let Some(raw) = &self.configdict {
            config.engine.configdict = Some(parse_configdict(raw)?);
        }
        for setting in &self.settings {
            let (key, value) = setting.split_once('=').ok_or_else(|| {
                CliError::new(USAGE, format!("--set expects KEY=VALUE, got '{setting}'"))
            })?;
            config
                .engine
                .settings
                .insert(key.trim().to_string(), value.to_string());
        }
        if let Some(kind) = self.transport {
            config.transport.kind = kind.into();
        }
        if let Some(port) = self.port {
            config.transport.port = port;
        }
        if self.quiet_worker {
            config.worker_output = WorkerOutput::Null;
        }
        Ok(config)
    }
}

fn parse_configdict(raw: &str) -> CliResult<Map<String, Value>> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CliError::new(USAGE, "--configdict must be a JSON object")),
        Err(err) => Err(CliError::new(USAGE, format!("--configdict is not valid JSON: {err}"))),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Resolve an optional `--timeout` flag against the configured default.
pub fn call_timeout(flag: Option<&str>, config: &ClientConfig) -> CliResult<Duration> {
    flag.map_or(Ok(config.policy.default_timeout), parse_duration)
}

/// Kill every live worker on Ctrl-C before exiting.
pub fn install_interrupt_handler() -> CliResult<()> {
    ctrlc::set_handler(|| {
        let reaped = reaper::reap_all();
        tracing::warn!(reaped, "interrupted");
        std::process::exit(INTERRUPTED);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_seconds_and_millis() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
        assert_eq!(parse_duration("soon").unwrap_err().code, USAGE);
        assert_eq!(parse_duration(" ").unwrap_err().code, USAGE);
    }

    #[test]
    fn flags_override_defaults() {
        let args = EngineArgs {
            mode: Some("pos".to_string()),
            settings: vec!["parse.maxlen=80".to_string()],
            transport: Some(TransportArg::Socket),
            port: Some(23000),
            engine_exe: Some(PathBuf::from("/opt/engine/run")),
            engine_args: vec!["--fast".to_string()],
            quiet_worker: true,
            ..EngineArgs::default()
        };
        let config = args.client_config().unwrap();
        assert_eq!(config.engine.mode.as_deref(), Some("pos"));
        assert_eq!(config.engine.settings["parse.maxlen"], "80");
        assert_eq!(config.transport.kind, TransportKind::Socket);
        assert_eq!(config.transport.port, 23000);
        assert_eq!(config.worker_output, WorkerOutput::Null);
        assert!(matches!(
            config.engine.launcher,
            Launcher::Executable { ref args, .. } if args == &["--fast".to_string()]
        ));
    }

    #[test]
    fn java_flags_build_a_java_launcher() {
        let args = EngineArgs {
            jars: vec!["/opt/corenlp/*".to_string()],
            heap: Some("2g".to_string()),
            ..EngineArgs::default()
        };
        let config = args.client_config().unwrap();
        let Launcher::Java(java) = config.engine.launcher else {
            panic!("expected a java launcher");
        };
        assert_eq!(java.engine_jars, ["/opt/corenlp/*"]);
        assert_eq!(java.heap_size, "2g");
        assert_eq!(java.java_command, PathBuf::from("java"));
    }

    #[test]
    fn malformed_settings_are_usage_errors() {
        let args = EngineArgs {
            settings: vec!["no-equals-sign".to_string()],
            ..EngineArgs::default()
        };
        assert_eq!(args.client_config().unwrap_err().code, USAGE);

        let args = EngineArgs {
            configdict: Some("[1, 2]".to_string()),
            ..EngineArgs::default()
        };
        assert_eq!(args.client_config().unwrap_err().code, USAGE);
    }

    #[test]
    fn config_file_is_loaded_before_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(
            &path,
            r#"{"transport": {"kind": "sentinel"}, "policy": {"retry_ceiling": 5}}"#,
        )
        .unwrap();

        let args = EngineArgs {
            config: Some(path),
            mode: Some("ssplit".to_string()),
            ..EngineArgs::default()
        };
        let config = args.client_config().unwrap();
        assert_eq!(config.transport.kind, TransportKind::Sentinel);
        assert_eq!(config.policy.retry_ceiling, 5);
        assert_eq!(config.engine.mode.as_deref(), Some("ssplit"));
    }
}
