//! The platform seam that creates server and client handles.
//!
//! [`Transport`] is the "create handle" collaborator: the socket types ask it
//! for the list of registered schemes, for a bound (and optionally
//! listening) server handle, and for a connected client handle. Everything
//! above this trait is platform-independent, so a test transport can stand
//! in for the real one.
//!
//! [`SystemTransport`] implements `tcp`, `udp`, `unix` and `udg` on top of
//! `socket2`.

use crate::capture::capture_all;
use crate::handle::Handle;
use crate::metadata::StreamType;
use crate::server::ServerFlags;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tracing::debug;

/// Nested `wrapper → option → value` map of connection options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextOptions(BTreeMap<String, BTreeMap<String, serde_json::Value>>);

impl ContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(
        mut self,
        wrapper: &str,
        option: &str,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.set(wrapper, option, value);
        self
    }

    pub fn set(&mut self, wrapper: &str, option: &str, value: impl Into<serde_json::Value>) {
        self.0
            .entry(wrapper.to_string())
            .or_default()
            .insert(option.to_string(), value.into());
    }

    pub fn get(&self, wrapper: &str, option: &str) -> Option<&serde_json::Value> {
        self.0.get(wrapper)?.get(option)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a client connect needs besides the URI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectOptions {
    pub timeout: Option<Duration>,
    pub persistent: bool,
    pub context: ContextOptions,
}

pub trait Transport: fmt::Debug {
    /// Registered scheme names.
    fn transports(&self) -> Vec<String>;

    /// Create a server handle for `address` (`scheme://authority` or
    /// `scheme://path`), binding and listening as `flags` ask.
    fn server(&self, address: &str, flags: ServerFlags) -> io::Result<Handle>;

    /// Connect to `uri`. `Ok(None)` means the transport produced neither a
    /// handle nor a diagnostic.
    fn client(&self, uri: &str, options: &ConnectOptions) -> io::Result<Option<Handle>>;
}

const SCHEMES: &[&str] = &["tcp", "udp", "unix", "udg"];

/// Default listen backlog.
pub const DEFAULT_BACKLOG: i32 = 128;

/// Process-wide persistent connections, keyed by URI.
fn persistent_registry() -> &'static Mutex<HashMap<String, Handle>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Handle>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Sockets through the operating system.
#[derive(Debug, Clone)]
pub struct SystemTransport {
    backlog: i32,
}

impl Default for SystemTransport {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
        }
    }
}

impl SystemTransport {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn backlog(&self) -> i32 {
        self.backlog
    }

    fn bind_inet(
        &self,
        scheme: &str,
        authority: &str,
        address: &str,
        flags: ServerFlags,
    ) -> io::Result<Handle> {
        let (ty, protocol, stream_type) = inet_kind(scheme)?;
        let addrs: Vec<SocketAddr> = authority.to_socket_addrs()?.collect();
        let (bound, diagnostics) = capture_all(|diags| {
            addrs.iter().find_map(|addr| {
                diags.record(self.bind_one(Domain::for_address(*addr), ty, protocol, &SockAddr::from(*addr), flags))
            })
        });
        match bound {
            Some(socket) => Ok(Handle::from_socket(socket, stream_type, Some(address.to_string()))),
            None => Err(diagnostics
                .into_last()
                .unwrap_or_else(|| no_address(authority))),
        }
    }

    fn bind_one(
        &self,
        domain: Domain,
        ty: Type,
        protocol: Option<Protocol>,
        addr: &SockAddr,
        flags: ServerFlags,
    ) -> io::Result<Socket> {
        let socket = Socket::new(domain, ty, protocol)?;
        if domain != Domain::UNIX {
            socket.set_reuse_address(true)?;
        }
        if flags.contains(ServerFlags::BIND) {
            socket.bind(addr)?;
        }
        if flags.contains(ServerFlags::LISTEN) && ty == Type::STREAM {
            socket.listen(self.backlog)?;
        }
        Ok(socket)
    }

    fn connect_inet(
        &self,
        scheme: &str,
        uri: &url::Url,
        options: &ConnectOptions,
    ) -> io::Result<Option<Handle>> {
        let (ty, protocol, stream_type) = inet_kind(scheme)?;
        let host = uri
            .host_str()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing host"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = uri
            .port()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing port"))?;
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        let (connected, diagnostics) = capture_all(|diags| {
            addrs.iter().find_map(|addr| {
                diags.record(connect_one(Domain::for_address(*addr), ty, protocol, &SockAddr::from(*addr), options))
            })
        });
        match connected {
            Some(socket) => Ok(Some(Handle::from_socket(
                socket,
                stream_type,
                Some(uri.to_string()),
            ))),
            None => match diagnostics.into_last() {
                Some(err) => Err(err),
                None => Ok(None),
            },
        }
    }
}

fn inet_kind(scheme: &str) -> io::Result<(Type, Option<Protocol>, StreamType)> {
    match scheme {
        "tcp" => Ok((Type::STREAM, Some(Protocol::TCP), StreamType::TcpSocket)),
        "udp" => Ok((Type::DGRAM, Some(Protocol::UDP), StreamType::UdpSocket)),
        other => Err(unsupported(other)),
    }
}

fn unix_kind(scheme: &str) -> io::Result<(Type, StreamType)> {
    match scheme {
        "unix" => Ok((Type::STREAM, StreamType::UnixSocket)),
        "udg" => Ok((Type::DGRAM, StreamType::UdgSocket)),
        other => Err(unsupported(other)),
    }
}

fn unsupported(scheme: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("unable to find the socket transport \"{scheme}\""),
    )
}

fn no_address(authority: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        format!("no address resolved for \"{authority}\""),
    )
}

fn connect_one(
    domain: Domain,
    ty: Type,
    protocol: Option<Protocol>,
    addr: &SockAddr,
    options: &ConnectOptions,
) -> io::Result<Socket> {
    let socket = Socket::new(domain, ty, protocol)?;
    if let Some(bindto) = options.context.get("socket", "bindto").and_then(|v| v.as_str()) {
        let local: SocketAddr = bindto.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid bindto address \"{bindto}\""),
            )
        })?;
        socket.bind(&SockAddr::from(local))?;
    }
    if ty == Type::STREAM && domain != Domain::UNIX {
        if let Some(nodelay) = options
            .context
            .get("socket", "tcp_nodelay")
            .and_then(|v| v.as_bool())
        {
            socket.set_nodelay(nodelay)?;
        }
    }
    match options.timeout {
        Some(timeout) if !timeout.is_zero() => socket.connect_timeout(addr, timeout)?,
        _ => socket.connect(addr)?,
    }
    Ok(socket)
}

/// A registered persistent connection that the peer has not closed.
fn reuse_persistent(uri: &str) -> Option<Handle> {
    let mut registry = persistent_registry().lock().ok()?;
    let live = registry.get(uri)?;
    if live.at_eof() {
        debug!(uri, "dropping closed persistent connection");
        registry.remove(uri);
        return None;
    }
    live.try_clone().ok()
}

fn register_persistent(uri: &str, handle: &Handle) {
    let Ok(copy) = handle.try_clone() else {
        return;
    };
    if let Ok(mut registry) = persistent_registry().lock() {
        registry.insert(uri.to_string(), copy);
    }
}

impl Transport for SystemTransport {
    fn transports(&self) -> Vec<String> {
        SCHEMES.iter().map(|s| (*s).to_string()).collect()
    }

    fn server(&self, address: &str, flags: ServerFlags) -> io::Result<Handle> {
        let (scheme, rest) = address.split_once("://").ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("malformed address \"{address}\""),
            )
        })?;
        if scheme == "unix" || scheme == "udg" {
            let (ty, stream_type) = unix_kind(scheme)?;
            let addr = SockAddr::unix(rest)?;
            let socket = self.bind_one(Domain::UNIX, ty, None, &addr, flags)?;
            return Ok(Handle::from_socket(
                socket,
                stream_type,
                Some(address.to_string()),
            ));
        }
        self.bind_inet(scheme, rest, address, flags)
    }

    fn client(&self, uri: &str, options: &ConnectOptions) -> io::Result<Option<Handle>> {
        if options.persistent {
            if let Some(handle) = reuse_persistent(uri) {
                debug!(uri, "reusing persistent connection");
                return Ok(Some(handle));
            }
        }
        let parsed = url::Url::parse(uri)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
        let scheme = parsed.scheme();
        let handle = if scheme == "unix" || scheme == "udg" {
            let (ty, stream_type) = unix_kind(scheme)?;
            let addr = SockAddr::unix(parsed.path())?;
            let socket = connect_one(Domain::UNIX, ty, None, &addr, options)?;
            Some(Handle::from_socket(socket, stream_type, Some(uri.to_string())))
        } else {
            self.connect_inet(scheme, &parsed, options)?
        };
        if options.persistent {
            if let Some(handle) = &handle {
                register_persistent(uri, handle);
            }
        }
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::os::fd::AsRawFd;

    #[test]
    fn registered_schemes() {
        let transports = SystemTransport::new().transports();
        assert_eq!(transports, vec!["tcp", "udp", "unix", "udg"]);
    }

    #[test]
    fn context_options_nested_lookup() {
        let ctx = ContextOptions::new()
            .with("socket", "bindto", "127.0.0.1:0")
            .with("socket", "tcp_nodelay", true);
        assert_eq!(
            ctx.get("socket", "bindto").and_then(|v| v.as_str()),
            Some("127.0.0.1:0")
        );
        assert_eq!(ctx.get("socket", "missing"), None);
        assert_eq!(ctx.get("ssl", "verify_peer"), None);
        assert!(!ctx.is_empty());

        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["socket"]["tcp_nodelay"], serde_json::Value::Bool(true));
    }

    #[test]
    fn tcp_server_binds_and_listens() {
        let transport = SystemTransport::new();
        let handle = transport
            .server("tcp://127.0.0.1:0", ServerFlags::default())
            .unwrap();
        assert_eq!(handle.stream_type(), StreamType::TcpSocket);
        assert_eq!(handle.uri(), Some("tcp://127.0.0.1:0"));
        let local = handle.socket_name(false);
        let client = std::net::TcpStream::connect(local.as_str());
        assert!(client.is_ok());
    }

    #[test]
    fn tcp_server_without_port_fails() {
        let err = SystemTransport::new()
            .server("tcp://0.0.0.0", ServerFlags::default())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn unregistered_scheme_fails() {
        let err = SystemTransport::new()
            .server("tls://127.0.0.1:0", ServerFlags::default())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn udp_server_ignores_listen() {
        let handle = SystemTransport::new()
            .server("udp://127.0.0.1:0", ServerFlags::default())
            .unwrap();
        assert_eq!(handle.stream_type(), StreamType::UdpSocket);
    }

    #[test]
    fn unix_server_and_client() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.sock");
        let address = format!("unix://{}", path.display());
        let transport = SystemTransport::new();
        let server = transport.server(&address, ServerFlags::default()).unwrap();
        assert_eq!(server.stream_type(), StreamType::UnixSocket);

        let client = transport
            .client(&address, &ConnectOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(client.stream_type(), StreamType::UnixSocket);
        assert_eq!(client.socket_name(true), path.display().to_string());
    }

    #[test]
    fn tcp_client_connects_and_honours_context() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let options = ConnectOptions {
            timeout: Some(Duration::from_secs(2)),
            persistent: false,
            context: ContextOptions::new()
                .with("socket", "bindto", "127.0.0.1:0")
                .with("socket", "tcp_nodelay", true),
        };
        let handle = SystemTransport::new()
            .client(&format!("tcp://127.0.0.1:{port}"), &options)
            .unwrap()
            .unwrap();
        assert_eq!(handle.stream_type(), StreamType::TcpSocket);
        assert!(socket2::SockRef::from(handle.fd()).nodelay().unwrap());
        let (mut accepted, _) = listener.accept().unwrap();
        let mut fd = handle.into_fd();
        fd.write_all(b"hi").unwrap();
        let mut buf = [0u8; 2];
        accepted.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn tcp_client_refused() {
        // bind then drop to find a port with nothing listening
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = SystemTransport::new()
            .client(&format!("tcp://127.0.0.1:{port}"), &ConnectOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn persistent_connection_is_reused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("tcp://127.0.0.1:{}", listener.local_addr().unwrap().port());
        let options = ConnectOptions {
            persistent: true,
            ..ConnectOptions::default()
        };
        let transport = SystemTransport::new();
        let first = transport.client(&uri, &options).unwrap().unwrap();
        let second = transport.client(&uri, &options).unwrap().unwrap();
        assert_ne!(first.as_raw_fd(), second.as_raw_fd());
        // both descriptors are the same connection
        assert_eq!(first.socket_name(false), second.socket_name(false));
        // only one connection reached the listener
        listener.set_nonblocking(true).unwrap();
        assert!(listener.accept().is_ok());
        assert!(listener.accept().is_err());
    }
}
