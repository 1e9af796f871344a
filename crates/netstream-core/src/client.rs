//! Outbound connections.
//!
//! A `SocketClient` holds nothing but configuration. Each `connect()` asks
//! the transport for a fresh handle and wraps it in an independently owned
//! [`SocketStream`].

use crate::capture::capture;
use crate::error::{Error, Result};
use crate::socket_stream::SocketStream;
use crate::transport::{ConnectOptions, ContextOptions, SystemTransport, Transport};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SocketClient {
    uri: String,
    options: ConnectOptions,
    transport: Arc<dyn Transport + Send + Sync>,
}

impl SocketClient {
    pub fn new(uri: impl Into<String>) -> Self {
        Self::with_transport(uri, Arc::new(SystemTransport::new()))
    }

    pub fn with_transport(uri: impl Into<String>, transport: Arc<dyn Transport + Send + Sync>) -> Self {
        Self {
            uri: uri.into(),
            options: ConnectOptions::default(),
            transport,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn set_persistent(&mut self, persistent: bool) -> &mut Self {
        self.options.persistent = persistent;
        self
    }

    /// Connect timeout; `None` leaves it to the platform.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.options.timeout = timeout;
        self
    }

    pub fn set_context(&mut self, context: ContextOptions) -> &mut Self {
        self.options.context = context;
        self
    }

    pub fn connect(&self) -> Result<SocketStream> {
        let handle = capture(
            || self.transport.client(&self.uri, &self.options),
            |source| {
                Err(Error::ClientConnectError {
                    uri: self.uri.clone(),
                    source: Some(source),
                })
            },
        )?
        .ok_or_else(|| Error::ClientConnectError {
            uri: self.uri.clone(),
            source: None,
        })?;
        debug!(
            uri = %self.uri,
            persistent = self.options.persistent,
            "client connected"
        );
        SocketStream::new(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;
    use crate::server::ServerFlags;
    use std::io;
    use std::net::TcpListener;

    /// Transport that yields no handle and no diagnostic.
    #[derive(Debug)]
    struct SilentTransport;

    impl Transport for SilentTransport {
        fn transports(&self) -> Vec<String> {
            vec!["tcp".to_string()]
        }

        fn server(&self, _address: &str, _flags: ServerFlags) -> io::Result<Handle> {
            Err(io::Error::from(io::ErrorKind::Unsupported))
        }

        fn client(&self, _uri: &str, _options: &ConnectOptions) -> io::Result<Option<Handle>> {
            Ok(None)
        }
    }

    #[test]
    fn setters_chain() {
        let mut client = SocketClient::new("tcp://localhost:80");
        client
            .set_persistent(true)
            .set_timeout(Some(Duration::from_secs(3)))
            .set_context(ContextOptions::new().with("socket", "tcp_nodelay", true));
        assert!(client.options().persistent);
        assert_eq!(client.options().timeout, Some(Duration::from_secs(3)));
        assert!(!client.options().context.is_empty());
        assert_eq!(client.uri(), "tcp://localhost:80");
    }

    #[test]
    fn connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = SocketClient::new(format!("tcp://{addr}"));
        let mut stream = client
            .set_timeout(Some(Duration::from_secs(2)))
            .connect()
            .unwrap();
        assert_eq!(stream.get_remote_name().unwrap(), addr.to_string());
        assert_eq!(stream.write(b"x").unwrap(), 1);
    }

    #[test]
    fn refused_connection_names_uri() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let uri = format!("tcp://127.0.0.1:{port}");
        let err = SocketClient::new(uri.clone()).connect().unwrap_err();
        match err {
            Error::ClientConnectError { uri: reported, source } => {
                assert_eq!(reported, uri);
                assert!(source.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn silent_transport_maps_to_connect_error() {
        let client = SocketClient::with_transport("tcp://localhost:80", Arc::new(SilentTransport));
        let err = client.connect().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Client could not connect to \"tcp://localhost:80\"."
        );
        assert!(matches!(
            err,
            Error::ClientConnectError { source: None, .. }
        ));
    }

    #[test]
    fn each_connect_is_independent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = SocketClient::new(format!("tcp://{}", listener.local_addr().unwrap()));
        let mut first = client.connect().unwrap();
        let second = client.connect().unwrap();
        first.close();
        assert!(second.is_connected());
    }
}
