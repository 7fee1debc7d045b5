use std::path::PathBuf;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::tokenize::annotate;

/// How the engine treats `PARSEDOC`, set with the `mock.behavior` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Normal,
    /// Exit without answering.
    CrashOnParse,
    /// Sleep for `mock.hang_ms` before answering.
    HangOnParse,
    /// Answer with bytes that are not JSON.
    GarbageOnParse,
}

impl Behavior {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "normal" => Some(Behavior::Normal),
            "crash_on_parse" => Some(Behavior::CrashOnParse),
            "hang_on_parse" => Some(Behavior::HangOnParse),
            "garbage_on_parse" => Some(Behavior::GarbageOnParse),
            _ => None,
        }
    }
}

/// What to do after handling one request.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Payload(Vec<u8>),
    Exit(i32),
}

/// Settings read from `mock.*` properties in the config dict.
#[derive(Debug, Clone)]
pub struct Engine {
    pub behavior: Behavior,
    pub pong: String,
    pub hang: Duration,
    /// Crash on the first `PARSEDOC` only: the marker file records that the
    /// crash already happened, so a restarted engine serves normally.
    pub crash_marker: Option<PathBuf>,
    pub startup_delay: Duration,
    pub exit_on_start: Option<i32>,
    pub annotators: Option<String>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            behavior: Behavior::Normal,
            pong: "PONG".to_string(),
            hang: Duration::from_secs(2),
            crash_marker: None,
            startup_delay: Duration::ZERO,
            exit_on_start: None,
            annotators: None,
        }
    }
}

fn setting(dict: &Map<String, Value>, key: &str) -> Option<String> {
    match dict.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn millis(dict: &Map<String, Value>, key: &str) -> Result<Option<Duration>, String> {
    setting(dict, key)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| format!("{key} must be a number of milliseconds, got '{raw}'"))
        })
        .transpose()
}

impl Engine {
    pub fn from_settings(dict: &Map<String, Value>) -> Result<Self, String> {
        let mut engine = Engine::default();
        if let Some(name) = setting(dict, "mock.behavior") {
            engine.behavior =
                Behavior::parse(&name).ok_or_else(|| format!("unknown mock.behavior '{name}'"))?;
        }
        if let Some(pong) = setting(dict, "mock.pong") {
            engine.pong = pong;
        }
        if let Some(hang) = millis(dict, "mock.hang_ms")? {
            engine.hang = hang;
        }
        if let Some(delay) = millis(dict, "mock.startup_delay_ms")? {
            engine.startup_delay = delay;
        }
        if let Some(code) = setting(dict, "mock.exit_on_start") {
            engine.exit_on_start = Some(
                code.parse()
                    .map_err(|_| format!("mock.exit_on_start must be an exit code, got '{code}'"))?,
            );
        }
        engine.crash_marker = setting(dict, "mock.crash_marker").map(PathBuf::from);
        engine.annotators = setting(dict, "annotators");
        Ok(engine)
    }

    /// Handle one request. `argument_json` is the raw JSON field of the line.
    pub fn handle(&mut self, verb: &str, argument_json: &str) -> Reply {
        match verb {
            "PING" => Reply::Payload(json_bytes(&Value::String(self.pong.clone()))),
            "PARSEDOC" => self.parse_doc(argument_json),
            "CRASH" => {
                warn!("CRASH requested; exiting");
                Reply::Exit(1)
            }
            other => {
                warn!(verb = other, "unknown command");
                Reply::Payload(b"null".to_vec())
            }
        }
    }

    fn parse_doc(&mut self, argument_json: &str) -> Reply {
        let text = match serde_json::from_str::<Value>(argument_json) {
            Ok(Value::String(text)) => text,
            Ok(_) | Err(_) => {
                warn!(len = argument_json.len(), "PARSEDOC argument is not a JSON string");
                return Reply::Payload(b"null".to_vec());
            }
        };

        if let Some(marker) = &self.crash_marker {
            if !marker.exists() {
                if let Err(err) = std::fs::write(marker, b"crashed") {
                    warn!(?marker, error = %err, "failed to write crash marker");
                }
                warn!("crashing on first PARSEDOC");
                return Reply::Exit(1);
            }
        }

        match self.behavior {
            Behavior::CrashOnParse => {
                warn!("crashing on PARSEDOC");
                Reply::Exit(1)
            }
            Behavior::GarbageOnParse => Reply::Payload(b"{not json".to_vec()),
            Behavior::HangOnParse => {
                info!(hang_ms = self.hang.as_millis() as u64, "stalling PARSEDOC");
                std::thread::sleep(self.hang);
                Reply::Payload(json_bytes(&annotate(&text)))
            }
            Behavior::Normal => Reply::Payload(json_bytes(&annotate(&text))),
        }
    }
}

fn json_bytes(value: &Value) -> Vec<u8> {
    value.to_string().into_bytes()
}
