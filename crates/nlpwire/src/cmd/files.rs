use std::path::{Path, PathBuf};

use nlpwire_worker::{Client, Response};
use tracing::warn;

use crate::cmd::{call_timeout, install_interrupt_handler, EngineArgs, FilesArgs};
use crate::exit::{worker_error, CliError, CliResult, FAILURE, SUCCESS, UNAVAILABLE};
use crate::output::{print_file_outcomes, FileOutcome, OutputFormat};

pub fn run(args: FilesArgs, engine: &EngineArgs, format: OutputFormat) -> CliResult<i32> {
    let config = engine.client_config()?;
    let timeout = call_timeout(args.timeout.as_deref(), &config)?;

    install_interrupt_handler()?;
    let mut client =
        Client::new(config).map_err(|err| worker_error("worker failed to start", err))?;

    let mut outcomes = Vec::with_capacity(args.paths.len());
    for input in args.paths {
        let text = match read_document(&input) {
            Ok(text) => text,
            Err(err) => {
                warn!(path = ?input, error = %err, "cannot read input");
                outcomes.push(FileOutcome {
                    input,
                    output: None,
                    status: "unreadable",
                });
                continue;
            }
        };

        let outcome = match client.parse_doc_raw(&text, timeout) {
            Response::Raw(payload) => {
                let output = annotation_path(&input);
                match std::fs::write(&output, &payload) {
                    Ok(()) => FileOutcome {
                        input,
                        output: Some(output),
                        status: "ok",
                    },
                    Err(err) => {
                        warn!(path = ?output, error = %err, "cannot write annotation");
                        FileOutcome {
                            input,
                            output: None,
                            status: "write failed",
                        }
                    }
                }
            }
            Response::Fatal(message) => {
                return Err(CliError::new(UNAVAILABLE, format!("worker unavailable: {message}")));
            }
            Response::Decoded(_) | Response::Null => FileOutcome {
                input,
                output: None,
                status: "no result",
            },
        };
        outcomes.push(outcome);
    }

    client.shutdown();
    print_file_outcomes(&outcomes, format);
    let all_ok = outcomes.iter().all(|outcome| outcome.status == "ok");
    Ok(if all_ok { SUCCESS } else { FAILURE })
}

/// Read a whole file as one document. Invalid UTF-8 becomes U+FFFD.
fn read_document(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            warn!(path = ?path, "replaced invalid UTF-8 in input file");
            Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
        }
    }
}

/// `doc.txt` becomes `doc.anno`; any other name gets `.anno` appended.
pub fn annotation_path(input: &Path) -> PathBuf {
    if input.extension().is_some_and(|ext| ext == "txt") {
        return input.with_extension("anno");
    }
    let mut name = input.as_os_str().to_os_string();
    name.push(".anno");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_utf8_file_is_read_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, b"Hello \xff\xfe world.").unwrap();
        assert_eq!(read_document(&path).unwrap(), "Hello \u{fffd}\u{fffd} world.");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_document(&dir.path().join("absent.txt")).is_err());
    }

    #[test]
    fn txt_suffix_is_replaced() {
        assert_eq!(annotation_path(Path::new("news/doc.txt")), PathBuf::from("news/doc.anno"));
        assert_eq!(annotation_path(Path::new("notes.md")), PathBuf::from("notes.md.anno"));
        assert_eq!(annotation_path(Path::new("README")), PathBuf::from("README.anno"));
    }
}
