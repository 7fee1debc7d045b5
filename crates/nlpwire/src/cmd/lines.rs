use std::borrow::Cow;
use std::io::BufRead;

use nlpwire_worker::{Client, Response};
use tracing::{info, warn};

use crate::cmd::{call_timeout, install_interrupt_handler, EngineArgs, LinesArgs};
use crate::exit::{io_error, worker_error, CliError, CliResult, SUCCESS, UNAVAILABLE};
use crate::output::print_line;

pub fn run(args: LinesArgs, engine: &EngineArgs) -> CliResult<i32> {
    let config = engine.client_config()?;
    let timeout = call_timeout(args.timeout.as_deref(), &config)?;

    install_interrupt_handler()?;
    let mut client =
        Client::new(config).map_err(|err| worker_error("worker failed to start", err))?;

    let mut stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    let mut buf = Vec::new();
    let mut documents = 0usize;
    let mut empty = 0usize;

    while let Some(line) =
        next_document(&mut stdin, &mut buf).map_err(|err| io_error("read stdin", err))?
    {
        documents += 1;
        let written = match client.parse_doc_raw(&line, timeout) {
            Response::Raw(payload) => print_line(&mut stdout, &payload),
            Response::Fatal(message) => {
                return Err(CliError::new(UNAVAILABLE, format!("worker unavailable: {message}")));
            }
            Response::Decoded(_) | Response::Null => {
                empty += 1;
                print_line(&mut stdout, b"null")
            }
        };
        written.map_err(|err| io_error("write stdout", err))?;
    }

    info!(documents, empty, "finished annotating stdin");
    client.shutdown();
    Ok(SUCCESS)
}

/// Read one newline-terminated document. Invalid UTF-8 becomes U+FFFD.
fn next_document(
    input: &mut impl BufRead,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if input.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    let text = String::from_utf8_lossy(buf);
    if matches!(text, Cow::Owned(_)) {
        warn!(len = buf.len(), "replaced invalid UTF-8 in input line");
    }
    Ok(Some(text.into_owned()))
}
