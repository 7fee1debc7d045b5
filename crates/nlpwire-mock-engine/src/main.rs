//! A stand-in engine that speaks the nlpwire protocol.
//!
//! It tokenizes on whitespace instead of running real annotators, and its
//! failure modes (crashes, stalls, garbage replies, slow startup) are driven
//! by `mock.*` properties in `--configdict`.

mod engine;
mod tokenize;

use std::io::{BufRead, BufReader};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};

use clap::Parser;
use nlpwire_frame::{write_sentinel, FrameError, FrameWriter};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::engine::{Engine, Reply};

const EXIT_USAGE: i32 = 64;
const EXIT_IO: i32 = 74;

#[derive(Parser, Debug)]
#[command(name = "nlpwire-mock-engine", version, about = "Mock NLP engine for nlpwire")]
struct Args {
    /// Serve requests on this loopback TCP port.
    #[arg(long, value_name = "PORT", conflicts_with_all = ["outpipe", "sentinel"])]
    server: Option<u16>,

    /// Read requests from stdin and write framed replies into this FIFO.
    #[arg(long, value_name = "PATH", conflicts_with = "sentinel")]
    outpipe: Option<PathBuf>,

    /// Read requests from stdin; each names the file to answer in.
    #[arg(long)]
    sentinel: bool,

    /// Engine properties file (accepted and logged).
    #[arg(long, value_name = "PATH")]
    configfile: Option<PathBuf>,

    /// Engine properties as a JSON object.
    #[arg(long, value_name = "JSON")]
    configdict: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();

    let args = Args::parse();
    let dict = match parse_configdict(args.configdict.as_deref()) {
        Ok(dict) => dict,
        Err(message) => {
            error!("{message}");
            std::process::exit(EXIT_USAGE);
        }
    };
    let mut engine = match Engine::from_settings(&dict) {
        Ok(engine) => engine,
        Err(message) => {
            error!("{message}");
            std::process::exit(EXIT_USAGE);
        }
    };

    if let Some(code) = engine.exit_on_start {
        warn!(code, "exiting on start");
        std::process::exit(code);
    }
    info!(
        configfile = ?args.configfile,
        annotators = engine.annotators.as_deref().unwrap_or("<none>"),
        "mock engine starting"
    );
    if !engine.startup_delay.is_zero() {
        std::thread::sleep(engine.startup_delay);
    }

    let served = if let Some(port) = args.server {
        serve_socket(port, &mut engine)
    } else if let Some(path) = &args.outpipe {
        serve_pipe(path, &mut engine)
    } else if args.sentinel {
        serve_sentinel(&mut engine)
    } else {
        error!("one of --server, --outpipe or --sentinel is required");
        std::process::exit(EXIT_USAGE);
    };

    if let Err(err) = served {
        error!(error = %err, "mock engine failed");
        std::process::exit(EXIT_IO);
    }
}

fn parse_configdict(raw: Option<&str>) -> Result<Map<String, Value>, String> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("--configdict must be a JSON object".to_string()),
        Err(err) => Err(format!("--configdict is not valid JSON: {err}")),
    }
}

/// Split `VERB\t<json>`; a bare verb gets an empty argument.
fn split_command(line: &str) -> (&str, &str) {
    line.split_once('\t').unwrap_or((line, "\"\""))
}

fn finish(
    reply: Reply,
    respond: impl FnOnce(&[u8]) -> Result<(), FrameError>,
) -> Result<(), FrameError> {
    match reply {
        Reply::Payload(payload) => respond(&payload),
        Reply::Exit(code) => std::process::exit(code),
    }
}

fn serve_socket(port: u16, engine: &mut Engine) -> Result<(), FrameError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
    info!(port, "listening");
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(err) = serve_connection(&stream, engine) {
                    warn!(error = %err, "request failed");
                }
            }
            Err(err) => warn!(error = %err, "accept failed"),
        }
    }
    Ok(())
}

fn serve_connection(stream: &TcpStream, engine: &mut Engine) -> Result<(), FrameError> {
    let mut line = String::new();
    if BufReader::new(stream).read_line(&mut line)? == 0 {
        return Ok(());
    }
    let (verb, argument) = split_command(line.trim_end_matches(['\r', '\n']));
    debug!(verb, "socket request");
    finish(engine.handle(verb, argument), |payload| {
        FrameWriter::new(stream).write_frame(payload)
    })
}

fn serve_pipe(path: &Path, engine: &mut Engine) -> Result<(), FrameError> {
    // Blocks until the client has its end of the fifo open.
    let fifo = std::fs::OpenOptions::new().write(true).open(path)?;
    let mut out = FrameWriter::new(fifo);
    info!(?path, "answering through fifo");

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let (verb, argument) = split_command(&line);
        debug!(verb, "pipe request");
        finish(engine.handle(verb, argument), |payload| out.write_frame(payload))?;
    }
    info!("stdin closed; exiting");
    Ok(())
}

fn serve_sentinel(engine: &mut Engine) -> Result<(), FrameError> {
    info!("answering through sentinel files");
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let mut fields = line.splitn(3, '\t');
        let (Some(verb), Some(response), argument) = (fields.next(), fields.next(), fields.next())
        else {
            warn!(line = %line, "malformed sentinel request");
            continue;
        };
        debug!(verb, response, "sentinel request");
        finish(engine.handle(verb, argument.unwrap_or("\"\"")), |payload| {
            write_sentinel(Path::new(response), payload)
        })?;
    }
    info!("stdin closed; exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_transport_flags() {
        let args = Args::try_parse_from(["nlpwire-mock-engine", "--server", "12340"]).unwrap();
        assert_eq!(args.server, Some(12340));

        let args = Args::try_parse_from([
            "nlpwire-mock-engine",
            "--outpipe",
            "/tmp/pipe",
            "--configdict",
            "{\"annotators\":\"tokenize, ssplit\"}",
        ])
        .unwrap();
        assert_eq!(args.outpipe, Some(PathBuf::from("/tmp/pipe")));
        assert!(args.configdict.is_some());
    }

    #[test]
    fn rejects_two_transports() {
        let err = Args::try_parse_from(["nlpwire-mock-engine", "--server", "1", "--sentinel"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn splits_commands() {
        assert_eq!(split_command("PING\t\"\""), ("PING", "\"\""));
        assert_eq!(split_command("PARSEDOC\t\"a\\tb\""), ("PARSEDOC", "\"a\\tb\""));
        assert_eq!(split_command("PING"), ("PING", "\"\""));
    }

    #[test]
    fn configdict_must_be_an_object() {
        assert!(parse_configdict(None).unwrap().is_empty());
        assert!(parse_configdict(Some("[1]")).is_err());
        assert!(parse_configdict(Some("{")).is_err());
        assert_eq!(parse_configdict(Some("{\"a\":1}")).unwrap().len(), 1);
    }
}
