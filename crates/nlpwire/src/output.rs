use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use nlpwire_worker::{Mode, TransportKind, WorkerState};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
    );
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn print_modes(modes: &[Mode], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&modes),
        OutputFormat::Table => {
            let mut table = table(vec!["MODE", "ANNOTATORS", "DESCRIPTION"]);
            for mode in modes {
                table.add_row(vec![mode.name, mode.annotators, mode.description]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for mode in modes {
                println!("{:<10} {}", mode.name, mode.annotators);
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PingReport {
    pub transport: TransportKind,
    pub pid: Option<u32>,
    pub state: WorkerState,
    pub reply: serde_json::Value,
    pub command: String,
}

pub fn print_ping(report: &PingReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = table(vec!["TRANSPORT", "PID", "STATE", "REPLY"]);
            table.add_row(vec![
                report.transport.to_string(),
                report.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string()),
                report.state.to_string(),
                report.reply.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "transport={} pid={} state={} reply={}",
                report.transport,
                report.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string()),
                report.state,
                report.reply
            );
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub status: &'static str,
}

pub fn print_file_outcomes(outcomes: &[FileOutcome], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&outcomes),
        OutputFormat::Table => {
            let mut table = table(vec!["INPUT", "OUTPUT", "STATUS"]);
            for outcome in outcomes {
                table.add_row(vec![
                    outcome.input.display().to_string(),
                    outcome
                        .output
                        .as_ref()
                        .map_or_else(|| "-".to_string(), |p| p.display().to_string()),
                    outcome.status.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for outcome in outcomes {
                println!("{} {}", outcome.status, outcome.input.display());
            }
        }
    }
}

/// Write one payload followed by a newline, flushing so pipelines see it.
pub fn print_line(out: &mut impl Write, payload: &[u8]) -> std::io::Result<()> {
    out.write_all(payload)?;
    out.write_all(b"\n")?;
    out.flush()
}
