//! netstream-core: uniform streams over OS handles
//!
//! This crate wraps byte-oriented OS handles (files, pipes, sockets) behind a
//! single capability-gated read/write/seek contract, adds the socket-specific
//! specializations (listening, connecting and accepted sockets), and provides
//! a keyed readiness multiplexer for callers that run their own event loop.
//!
//! # Architecture
//!
//! ```text
//! SocketClient ──connect──┐
//!                         ├──> SocketStream ──┐
//! SocketServer ──accept───┘       (Stream)    ├──> StreamCollection ──poll(2)──> ready keys
//! StreamFactory ──files/temp──> Stream ───────┘
//! ```
//!
//! # Modules
//!
//! - `stream`: Capability-gated stream over one owned handle
//! - `socket_stream`: Socket operations layered on a stream
//! - `server`: Listening socket with accept
//! - `client`: Outbound connection configuration and connect
//! - `collection`: Keyed readiness multiplexer
//! - `transport`: Platform seam that creates server and client handles
//! - `handle`: Owned descriptor plus the properties reported for it
//! - `mode`: Open-mode capability tables
//! - `metadata`: Typed stream metadata
//! - `capture`: Conversion of OS diagnostics into typed failures
//! - `factory`: Construction conveniences
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod capture;
pub mod client;
pub mod collection;
pub mod config;
pub mod error;
pub mod factory;
pub mod handle;
pub mod logging;
pub mod metadata;
pub mod mode;
mod poll;
pub mod server;
pub mod socket_stream;
pub mod stream;
pub mod transport;

pub use client::SocketClient;
pub use collection::{Endpoint, Selectable, StreamCollection};
pub use config::Config;
pub use error::{Error, Result};
pub use factory::StreamFactory;
pub use handle::Handle;
pub use metadata::{Metadata, StreamType};
pub use server::{ServerFlags, SocketServer};
pub use socket_stream::SocketStream;
pub use stream::{ByteStream, Stream};
pub use transport::{ConnectOptions, ContextOptions, SystemTransport, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
