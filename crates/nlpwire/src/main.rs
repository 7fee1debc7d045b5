mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, EngineArgs};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "nlpwire", version, about = "Annotate text with a supervised NLP engine")]
struct Cli {
    /// Output format for command results.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "NLPWIRE_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, &cli.engine, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cmd::TransportArg;

    #[test]
    fn parses_lines_with_engine_flags() {
        let cli = Cli::try_parse_from([
            "nlpwire",
            "--mode",
            "ssplit",
            "--transport",
            "socket",
            "--port",
            "12345",
            "lines",
            "--timeout",
            "30s",
        ])
        .expect("lines args should parse");

        let Command::Lines(args) = &cli.command else {
            panic!("expected lines");
        };
        assert_eq!(args.timeout.as_deref(), Some("30s"));
        assert_eq!(cli.engine.mode.as_deref(), Some("ssplit"));
        assert_eq!(cli.engine.transport, Some(TransportArg::Socket));
        assert_eq!(cli.engine.port, Some(12345));
    }

    #[test]
    fn engine_flags_are_global() {
        let cli = Cli::try_parse_from([
            "nlpwire",
            "files",
            "a.txt",
            "b.txt",
            "--jar",
            "/opt/corenlp/*",
            "--jar",
            "/opt/models.jar",
        ])
        .expect("files args should parse");

        let Command::Files(args) = cli.command else {
            panic!("expected files");
        };
        assert_eq!(args.paths, [PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
        assert_eq!(cli.engine.jars, ["/opt/corenlp/*", "/opt/models.jar"]);
    }

    #[test]
    fn files_requires_paths() {
        let err = Cli::try_parse_from(["nlpwire", "files"]).expect_err("paths are required");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn engine_exe_conflicts_with_java_flags() {
        let err = Cli::try_parse_from([
            "nlpwire",
            "--engine-exe",
            "/opt/engine",
            "--heap",
            "2g",
            "ping",
        ])
        .expect_err("conflicting launchers should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn engine_args_accept_leading_hyphens() {
        let cli = Cli::try_parse_from([
            "nlpwire",
            "--engine-exe",
            "/opt/engine",
            "--engine-arg",
            "--threads=2",
            "ping",
        ])
        .expect("engine args should parse");
        assert_eq!(cli.engine.engine_args, ["--threads=2"]);
        assert!(matches!(cli.command, Command::Ping));
    }
}
