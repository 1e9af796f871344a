//! Error types for netstream-core
//!
//! Every platform diagnostic is converted into one of these variants at the
//! call site that raised it. Each variant carries a stable numeric code
//! (see [`Error::code`]) grouped by the component that raises it:
//!
//! | Range | Component        |
//! |-------|------------------|
//! | 1xxx  | Stream           |
//! | 2xxx  | Socket server    |
//! | 3xxx  | Socket client    |
//! | 4xxx  | Collection       |
//! | 5xxx  | Factory          |
//! | 7xxx  | Configuration    |
//! | 9xxx  | Internal / I/O   |

use std::io;
use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for netstream-core
#[derive(Error, Debug)]
pub enum Error {
    /// The value handed to a stream constructor is not an open stream handle
    #[error("Invalid stream provided: {0}")]
    InvalidHandle(String),

    /// Operation on a stream whose handle was closed or detached
    #[error("Stream is detached")]
    StreamDetached,

    #[error("Stream is not readable")]
    NotReadable,

    #[error("Stream is not writable")]
    NotWritable,

    #[error("Stream is not seekable")]
    NotSeekable,

    #[error("Failed read() on stream: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("Failed write() on stream: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("Failed to seek: {0}")]
    SeekFailed(#[source] io::Error),

    #[error("Failed tell() on stream: {0}")]
    TellFailed(#[source] io::Error),

    /// Scheme is not in the transport's registered list
    #[error("Scheme '{0}' is not supported.")]
    UnsupportedScheme(String),

    /// Scheme is registered but belongs to neither the internet nor the
    /// unix-domain family
    #[error("Could not handle scheme '{0}'.")]
    UnhandledScheme(String),

    #[error("Invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// Bind or listen failed
    #[error("Could not create socket for '{uri}'.")]
    ServerSocketError {
        uri: String,
        #[source]
        source: io::Error,
    },

    #[error("Server is closed.")]
    ServerClosed,

    #[error("Could not accept on socket.")]
    ServerAcceptError(#[source] io::Error),

    /// Connect failed; `source` is absent when the transport produced
    /// neither a handle nor a diagnostic
    #[error("Client could not connect to \"{uri}\".")]
    ClientConnectError {
        uri: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("Key '{0}' is already attached.")]
    DuplicateKey(String),

    /// The member's descriptor is already registered under another key
    #[error("Member is already attached as '{0}'.")]
    DuplicateMember(String),

    #[error("Readiness poll failed: {0}")]
    PollFailed(#[source] io::Error),

    #[error("File '{0}' does not exist.")]
    FileNotFound(String),

    #[error("Invalid mode '{0}'.")]
    InvalidMode(String),

    #[error("Could not open '{path}'.")]
    OpenFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Descriptor-level failures from netstream-fd
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] netstream_fd::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Stable numeric code for this error kind.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::InvalidHandle(_) => 1001,
            Self::StreamDetached => 1002,
            Self::NotReadable => 1003,
            Self::NotWritable => 1004,
            Self::NotSeekable => 1005,
            Self::ReadFailed(_) => 1010,
            Self::WriteFailed(_) => 1011,
            Self::SeekFailed(_) => 1012,
            Self::TellFailed(_) => 1013,
            Self::UnsupportedScheme(_) => 2001,
            Self::UnhandledScheme(_) => 2002,
            Self::InvalidUri { .. } => 2003,
            Self::ServerSocketError { .. } => 2010,
            Self::ServerClosed => 2011,
            Self::ServerAcceptError(_) => 2012,
            Self::ClientConnectError { .. } => 3001,
            Self::DuplicateKey(_) => 4001,
            Self::DuplicateMember(_) => 4002,
            Self::PollFailed(_) => 4010,
            Self::FileNotFound(_) => 5001,
            Self::InvalidMode(_) => 5002,
            Self::OpenFailed { .. } => 5003,
            Self::Config(_) => 7001,
            Self::Descriptor(_) => 9001,
            Self::Io(_) => 9002,
        }
    }

    /// True for the misuse errors raised by capability and lifecycle checks,
    /// as opposed to failures reported by the platform.
    #[must_use]
    pub const fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::StreamDetached
                | Self::NotReadable
                | Self::NotWritable
                | Self::NotSeekable
                | Self::ServerClosed
                | Self::DuplicateKey(_)
                | Self::DuplicateMember(_)
        )
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e)
            | Error::ReadFailed(e)
            | Error::WriteFailed(e)
            | Error::SeekFailed(e)
            | Error::TellFailed(e) => e,
            Error::NotSeekable => io::Error::new(io::ErrorKind::Unsupported, err),
            Error::NotReadable | Error::NotWritable => {
                io::Error::new(io::ErrorKind::PermissionDenied, err)
            }
            Error::StreamDetached => io::Error::new(io::ErrorKind::NotConnected, err),
            other => io::Error::other(other),
        }
    }
}
