use nlpwire_worker::{is_pong, Client, Response};
use serde_json::Value;

use crate::cmd::{install_interrupt_handler, EngineArgs};
use crate::exit::{worker_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_ping, OutputFormat, PingReport};

pub fn run(engine: &EngineArgs, format: OutputFormat) -> CliResult<i32> {
    let config = engine.client_config()?;
    let command = config
        .engine
        .launch_command()
        .map(|command| command.to_string())
        .map_err(|err| worker_error("invalid engine configuration", err))?;

    install_interrupt_handler()?;
    let mut client =
        Client::new(config).map_err(|err| worker_error("worker failed to start", err))?;

    let reply = match client.ping() {
        Response::Decoded(value) => value,
        Response::Raw(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        Response::Null | Response::Fatal(_) => Value::Null,
    };
    let healthy = is_pong(&reply);

    print_ping(
        &PingReport {
            transport: client.transport(),
            pid: client.worker_pid(),
            state: client.state(),
            reply,
            command,
        },
        format,
    );
    client.shutdown();

    Ok(if healthy { SUCCESS } else { FAILURE })
}
