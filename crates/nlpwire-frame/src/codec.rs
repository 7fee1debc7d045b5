use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Response header: a single big-endian u64 payload length.
pub const HEADER_SIZE: usize = 8;

/// Default maximum response payload: 1 GiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024 * 1024;

/// Default pause between polls when no response bytes are available.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default number of idle polls tolerated while a payload is partially read.
pub const DEFAULT_IDLE_POLL_BUDGET: u32 = 1000;

const FIELD_SEPARATOR: u8 = b'\t';
const LINE_TERMINATOR: u8 = b'\n';

/// One response frame from the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a request line.
///
/// Fields are joined with tabs and the line is terminated with a newline:
/// ```text
/// PARSEDOC\t"Hello world."\n
/// ```
/// No field may contain a newline, and only the last field may contain a tab.
pub fn encode_command(fields: &[&str], dst: &mut BytesMut) -> Result<()> {
    if fields.is_empty() || fields[0].is_empty() {
        return Err(FrameError::InvalidCommand("missing verb".to_string()));
    }

    let last = fields.len() - 1;
    for (idx, field) in fields.iter().enumerate() {
        if field.as_bytes().contains(&LINE_TERMINATOR) {
            return Err(FrameError::InvalidCommand(format!(
                "field {idx} contains a newline"
            )));
        }
        if idx != last && field.as_bytes().contains(&FIELD_SEPARATOR) {
            return Err(FrameError::InvalidCommand(format!(
                "field {idx} contains a tab"
            )));
        }
    }

    let len: usize = fields.iter().map(|f| f.len() + 1).sum();
    dst.reserve(len);
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            dst.put_u8(FIELD_SEPARATOR);
        }
        dst.put_slice(field.as_bytes());
    }
    dst.put_u8(LINE_TERMINATOR);
    Ok(())
}

/// Encode a response frame into the wire format.
///
/// ```text
/// ┌──────────────────────┬──────────────────┐
/// │ Length (8B, BE u64)  │ Payload          │
/// └──────────────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u64(payload.len() as u64);
    dst.put_slice(payload);
}

/// Decode a response frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(payload_len) = peek_payload_len(src) else {
        return Ok(None);
    };

    if payload_len > max_payload as u64 {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len as usize;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len as usize).freeze();
    Ok(Some(Frame { payload }))
}

/// The announced payload length, once the full header is buffered.
pub(crate) fn peek_payload_len(src: &[u8]) -> Option<u64> {
    let header: [u8; HEADER_SIZE] = src.get(..HEADER_SIZE)?.try_into().ok()?;
    Some(u64::from_be_bytes(header))
}

/// Configuration for the response reader.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 1 GiB.
    pub max_payload_size: usize,
    /// Pause between polls when the stream has no data. Default: 10 ms.
    pub poll_interval: Duration,
    /// Idle polls allowed once a payload has started arriving. Default: 1000.
    pub idle_poll_budget: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            idle_poll_budget: DEFAULT_IDLE_POLL_BUDGET,
        }
    }
}
