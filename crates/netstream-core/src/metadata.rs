//! Typed stream metadata.
//!
//! Metadata is reported as a struct, and callers that want the loose
//! string-keyed view get it through [`Metadata::get`], which treats unknown
//! keys as absent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Underlying transport type of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
    /// Plain files, pipes and character devices
    #[serde(rename = "STDIO")]
    Stdio,
    /// Anonymous temporary stream created by the factory
    #[serde(rename = "TEMP")]
    Temp,
    #[serde(rename = "tcp_socket")]
    TcpSocket,
    #[serde(rename = "udp_socket")]
    UdpSocket,
    #[serde(rename = "unix_socket")]
    UnixSocket,
    #[serde(rename = "udg_socket")]
    UdgSocket,
}

impl StreamType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "STDIO",
            Self::Temp => "TEMP",
            Self::TcpSocket => "tcp_socket",
            Self::UdpSocket => "udp_socket",
            Self::UnixSocket => "unix_socket",
            Self::UdgSocket => "udg_socket",
        }
    }

    pub const fn is_socket(self) -> bool {
        !matches!(self, Self::Stdio | Self::Temp)
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Properties the platform reports for an open handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// The last read or write gave up because the configured timeout expired
    pub timed_out: bool,
    /// The handle is in blocking mode
    pub blocked: bool,
    /// The last read hit end-of-stream
    pub eof: bool,
    /// Wrapper that opened the handle, when there is one
    pub wrapper_type: Option<String>,
    pub stream_type: StreamType,
    pub mode: String,
    /// Bytes that can be read without blocking
    pub unread_bytes: usize,
    pub seekable: bool,
    pub uri: Option<String>,
}

impl Metadata {
    /// Look up a single property by its key.
    ///
    /// Unknown keys and properties without a value return `None`.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let value: serde_json::Value = match key {
            "timed_out" => self.timed_out.into(),
            "blocked" => self.blocked.into(),
            "eof" => self.eof.into(),
            "wrapper_type" => self.wrapper_type.clone()?.into(),
            "stream_type" => self.stream_type.as_str().into(),
            "mode" => self.mode.clone().into(),
            "unread_bytes" => self.unread_bytes.into(),
            "seekable" => self.seekable.into(),
            "uri" => self.uri.clone()?.into(),
            _ => return None,
        };
        Some(value)
    }

    /// The string-keyed map view of all properties.
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}
