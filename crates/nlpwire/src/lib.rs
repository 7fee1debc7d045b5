//! Drive an external NLP engine as a supervised worker process.
//!
//! # Crate Structure
//!
//! - [`transport`]: loopback socket and named FIFO byte channels
//! - [`frame`]: request lines, length-prefixed responses and sentinel files
//! - [`worker`]: engine configuration, supervision and the RPC [`Client`]

/// Re-export transport types.
pub mod transport {
    pub use nlpwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use nlpwire_frame::*;
}

/// Re-export worker types.
pub mod worker {
    pub use nlpwire_worker::*;
}

pub use nlpwire_worker::{Client, ClientConfig, Response, WorkerError};
