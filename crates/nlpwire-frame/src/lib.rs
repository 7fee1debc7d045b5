//! Framing for the engine wire protocol.
//!
//! The protocol is asymmetric:
//! - requests are single text lines, `VERB\t<json>\n`
//! - responses are an 8-byte big-endian length followed by that many bytes
//!
//! [`FrameReader`] hides partial reads and polls with a bounded idle budget,
//! so a silent or dead worker turns into an error instead of a hang. The
//! older sentinel-file variant of the response channel lives in [`sentinel`].

pub mod codec;
pub mod error;
pub mod reader;
pub mod sentinel;
pub mod writer;

pub use codec::{
    decode_frame, encode_command, encode_frame, Frame, FrameConfig, DEFAULT_IDLE_POLL_BUDGET,
    DEFAULT_MAX_PAYLOAD, DEFAULT_POLL_INTERVAL, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use sentinel::{read_sentinel, write_sentinel, SENTINEL};
pub use writer::{CommandWriter, FrameWriter};
