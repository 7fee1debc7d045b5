use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Reply payload a ready worker sends to `PING`.
pub const PONG: &str = "PONG";

/// Bytes of a bad payload included in the warning log.
const BAD_PAYLOAD_PREVIEW: usize = 1000;

/// Request verbs understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    /// Liveness and readiness probe. Argument is ignored.
    Ping,
    /// Annotate one document. Argument is the document text.
    ParseDoc,
    /// Make the engine fail the request. Diagnostic only.
    Crash,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Ping => "PING",
            Verb::ParseDoc => "PARSEDOC",
            Verb::Crash => "CRASH",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one call.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// The payload parsed as JSON.
    Decoded(Value),
    /// The caller asked for the payload undecoded.
    Raw(Bytes),
    /// No usable result: timeout, undecodable payload, or retries exhausted.
    Null,
    /// The worker could not be (re)started; the client is unusable.
    Fatal(String),
}

impl Response {
    pub fn is_null(&self) -> bool {
        matches!(self, Response::Null)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Response::Fatal(_))
    }

    /// The decoded value, if any.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Response::Decoded(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Response::Decoded(value) => Some(value),
            _ => None,
        }
    }

    /// The raw payload, if any.
    pub fn into_raw(self) -> Option<Bytes> {
        match self {
            Response::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// JSON-encode a request argument for the wire.
///
/// JSON escapes control characters, so the result never contains the
/// newline that terminates a request line.
pub fn encode_argument(argument: &str) -> String {
    Value::String(argument.to_owned()).to_string()
}

/// Decode a response payload, logging and returning `None` when it is not JSON.
pub fn decode_payload(payload: &[u8]) -> Option<Value> {
    match serde_json::from_slice(payload) {
        Ok(value) => Some(value),
        Err(err) => {
            let preview = &payload[..payload.len().min(BAD_PAYLOAD_PREVIEW)];
            warn!(
                len = payload.len(),
                error = %err,
                starts_with = %String::from_utf8_lossy(preview),
                "bad JSON returned from worker; returning null"
            );
            None
        }
    }
}

/// True when a decoded payload is the `PONG` handshake reply.
pub fn is_pong(value: &Value) -> bool {
    value.as_str() == Some(PONG)
}
