//! Listening socket with accept.
//!
//! Construction validates the URI's scheme against the transport's
//! registered list before anything touches the platform, composes the
//! transport address from the scheme family, and asks the transport to bind
//! (and listen). The server is `Open` until `close()` or drop.

use crate::capture::capture;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::metadata::Metadata;
use crate::poll::{READ_READY, interest, poll_until};
use crate::socket_stream::SocketStream;
use crate::transport::{SystemTransport, Transport};
use bitflags::bitflags;
use socket2::SockRef;
use std::io;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

bitflags! {
    /// Server construction flags, passed through to the transport.
    pub struct ServerFlags: u32 {
        const BIND = 4;
        const LISTEN = 8;
    }
}

impl Default for ServerFlags {
    fn default() -> Self {
        Self::BIND | Self::LISTEN
    }
}

const INTERNET_SCHEMES: &[&str] = &["tcp", "udp", "tls", "ssl"];
const UNIX_SCHEMES: &[&str] = &["unix", "udg"];

/// Compose the transport address for `uri`, or reject its scheme.
fn transport_address(uri: &str, transports: &[String]) -> Result<String> {
    let parsed = url::Url::parse(uri).map_err(|err| Error::InvalidUri {
        uri: uri.to_string(),
        reason: err.to_string(),
    })?;
    let scheme = parsed.scheme();
    if !transports.iter().any(|t| t == scheme) {
        return Err(Error::UnsupportedScheme(scheme.to_string()));
    }
    let family = scheme.get(..3).unwrap_or(scheme);
    if INTERNET_SCHEMES.contains(&family) {
        Ok(format!("{scheme}://{}", parsed.authority()))
    } else if UNIX_SCHEMES.contains(&scheme) {
        Ok(format!("{scheme}://{}", parsed.path()))
    } else {
        Err(Error::UnhandledScheme(scheme.to_string()))
    }
}

#[derive(Debug)]
pub struct SocketServer {
    uri: String,
    handle: Option<Handle>,
    transport: Arc<dyn Transport + Send + Sync>,
}

impl SocketServer {
    /// Bind (and listen) on `uri` through the system transport.
    pub fn new(uri: &str, flags: ServerFlags) -> Result<Self> {
        Self::with_transport(uri, flags, Arc::new(SystemTransport::new()))
    }

    pub fn with_transport(
        uri: &str,
        flags: ServerFlags,
        transport: Arc<dyn Transport + Send + Sync>,
    ) -> Result<Self> {
        let address = transport_address(uri, &transport.transports())?;
        let handle = capture(
            || transport.server(&address, flags),
            |source| {
                Err(Error::ServerSocketError {
                    uri: uri.to_string(),
                    source,
                })
            },
        )?;
        debug!(uri, address = %address, flags = flags.bits(), "server socket created");
        Ok(Self {
            uri: uri.to_string(),
            handle: Some(handle),
            transport,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }

    /// Accept one pending connection.
    ///
    /// - non-blocking mode: waits up to `timeout` (zero when `None`) and
    ///   returns `Ok(None)` when nothing arrived;
    /// - blocking mode without a timeout: waits until a connection arrives;
    /// - blocking mode with a timeout: nothing arriving in time is an
    ///   [`Error::ServerAcceptError`].
    pub fn accept(&mut self, timeout: Option<Duration>) -> Result<Option<SocketStream>> {
        let handle = self.handle.as_ref().ok_or(Error::ServerClosed)?;
        let blocking = handle.is_blocking()?;
        let wait = if blocking {
            timeout
        } else {
            Some(timeout.unwrap_or(Duration::ZERO))
        };
        if let Some(limit) = wait {
            let mut pfds = [interest(handle.as_raw_fd(), READ_READY)];
            if poll_until(&mut pfds, Some(limit))? == 0 {
                if blocking {
                    return Err(Error::ServerAcceptError(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "accept timed out",
                    )));
                }
                return Ok(None);
            }
        }
        let accepted = capture(
            || SockRef::from(handle.fd()).accept().map(Some),
            |err| {
                if !blocking && err.kind() == io::ErrorKind::WouldBlock {
                    Ok(None)
                } else {
                    Err(Error::ServerAcceptError(err))
                }
            },
        )?;
        let Some((socket, peer)) = accepted else {
            return Ok(None);
        };
        debug!(
            uri = %self.uri,
            peer = ?peer.as_socket(),
            "accepted connection"
        );
        let stream = Handle::from_socket(socket, handle.stream_type(), None);
        SocketStream::new(stream).map(Some)
    }

    /// Scheme names registered with this server's transport.
    pub fn get_transports(&self) -> Vec<String> {
        self.transport.transports()
    }

    pub fn set_blocking(&mut self, enable: bool) -> Result<bool> {
        let handle = self.handle.as_ref().ok_or(Error::ServerClosed)?;
        Ok(handle.set_blocking(enable).is_ok())
    }

    /// `None` once closed.
    pub fn is_blocking(&self) -> Option<bool> {
        self.get_metadata().map(|meta| meta.blocked)
    }

    /// `None` once closed.
    pub fn get_metadata(&self) -> Option<Metadata> {
        self.handle.as_ref().map(Handle::metadata)
    }

    pub fn get_metadata_value(&self, key: &str) -> Option<serde_json::Value> {
        self.get_metadata()?.get(key)
    }

    /// The bound address, which tells a caller the port chosen for `:0`.
    pub fn get_local_name(&self) -> Result<String> {
        let handle = self.handle.as_ref().ok_or(Error::ServerClosed)?;
        Ok(handle.socket_name(false))
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!(uri = %self.uri, "server socket closed");
        }
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        self.close();
    }
}
