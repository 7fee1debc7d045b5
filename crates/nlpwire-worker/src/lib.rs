//! Supervised NLP engine worker with a crash- and timeout-aware RPC client.
//!
//! A [`Client`] owns one engine subprocess. It launches the engine, waits for
//! a PING/PONG handshake, then sends `VERB\t<json>` requests and reads framed
//! JSON replies over a [`TransportBinding`] (loopback socket, named FIFO or
//! sentinel files).
//!
//! ```no_run
//! use nlpwire_worker::{Client, ClientConfig, Launcher};
//!
//! let mut config = ClientConfig::default();
//! config.engine.launcher = Launcher::Executable {
//!     program: "nlpwire-mock-engine".into(),
//!     args: Vec::new(),
//! };
//! config.engine.mode = Some("ssplit".to_string());
//!
//! let mut client = Client::new(config)?;
//! let reply = client.parse_doc("Hello world.");
//! println!("{:?}", reply.into_value());
//! # Ok::<(), nlpwire_worker::WorkerError>(())
//! ```

pub mod binding;
pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod modes;
pub mod protocol;
pub mod reaper;
pub mod supervisor;

pub use binding::{binding_for, ExchangeError, SentinelBinding, SocketBinding, TransportBinding};
pub use client::{Client, RetryState};
pub use config::{
    CallPolicy, ClientConfig, EngineConfig, FrameSettings, JavaLauncher, LaunchCommand, Launcher,
    TransportConfig, TransportKind, WorkerOutput, DEFAULT_CALL_TIMEOUT, DEFAULT_RETRY_CEILING,
};
pub use error::{Result, WorkerError};
pub use handshake::{await_ready, HandshakeConfig, HandshakeResult};
pub use modes::{find_mode, Mode, MODES};
pub use protocol::{decode_payload, encode_argument, is_pong, Response, Verb, PONG};
pub use supervisor::{Supervisor, WorkerState};

#[cfg(unix)]
pub use binding::PipeBinding;
