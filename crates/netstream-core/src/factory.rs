//! Construction conveniences.
//!
//! [`StreamFactory`] is the single place that knows how to turn content,
//! paths, raw handles and URIs into the crate's stream types, applying the
//! configured server and client defaults on the way.

use crate::client::SocketClient;
use crate::collection::{Endpoint, StreamCollection};
use crate::config::{ClientConfig, Config, ServerConfig};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::metadata::StreamType;
use crate::mode;
use crate::server::{ServerFlags, SocketServer};
use crate::socket_stream::SocketStream;
use crate::stream::Stream;
use crate::transport::{SystemTransport, Transport};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Mode of the anonymous streams returned by [`StreamFactory::create_stream`].
pub const TEMP_MODE: &str = "w+b";

#[derive(Debug, Clone)]
pub struct StreamFactory {
    transport: Arc<dyn Transport + Send + Sync>,
    server: ServerConfig,
    client: ClientConfig,
}

impl Default for StreamFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFactory {
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    /// Factory whose servers use `config.server` and whose clients use
    /// `config.client`.
    pub fn with_config(config: &Config) -> Self {
        let transport = SystemTransport::new().with_backlog(config.server.backlog);
        Self {
            transport: Arc::new(transport),
            server: config.server.clone(),
            client: config.client.clone(),
        }
    }

    /// Replace the transport used for servers and clients.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport + Send + Sync>) -> Self {
        self.transport = transport;
        self
    }

    /// Anonymous read/write stream holding `content`.
    ///
    /// The position is left after the written content; call `rewind()`
    /// before reading it back.
    pub fn create_stream(&self, content: &[u8]) -> Result<Stream> {
        let file = tempfile::tempfile()?;
        let handle = Handle::from_file(file, TEMP_MODE)?.with_stream_type(StreamType::Temp);
        let mut stream = Stream::new(handle)?;
        if !content.is_empty() {
            stream.write(content)?;
        }
        Ok(stream)
    }

    /// Open `path` with an open mode such as `r`, `w+` or `ab`.
    ///
    /// The file must already exist, whatever the mode.
    pub fn create_stream_from_file(&self, path: impl AsRef<Path>, mode: &str) -> Result<Stream> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        if !path.exists() {
            return Err(Error::FileNotFound(shown));
        }
        let options = mode::open_options(mode).ok_or_else(|| Error::InvalidMode(mode.to_string()))?;
        let file = options.open(path).map_err(|source| Error::OpenFailed {
            path: shown.clone(),
            source,
        })?;
        debug!(path = %shown, mode, "file opened");
        Stream::new(Handle::from_file(file, mode)?.with_uri(shown))
    }

    pub fn create_stream_from_resource(&self, handle: Handle) -> Result<Stream> {
        Stream::new(handle)
    }

    pub fn create_socket_stream_from_resource(&self, handle: Handle) -> Result<SocketStream> {
        SocketStream::new(handle)
    }

    /// Bind (and listen) on `uri`. `None` flags means bind and listen.
    pub fn create_socket_server(
        &self,
        uri: &str,
        flags: Option<ServerFlags>,
    ) -> Result<SocketServer> {
        let mut server = SocketServer::with_transport(
            uri,
            flags.unwrap_or_default(),
            Arc::clone(&self.transport),
        )?;
        if !self.server.blocking {
            server.set_blocking(false)?;
        }
        Ok(server)
    }

    /// Client for `uri` carrying the configured timeout, persistence and
    /// context options.
    pub fn create_socket_client(&self, uri: &str) -> SocketClient {
        let mut client = SocketClient::with_transport(uri, Arc::clone(&self.transport));
        client
            .set_timeout(self.client.timeout())
            .set_persistent(self.client.persistent)
            .set_context(self.client.context.clone());
        client
    }

    pub fn create_stream_collection(&self) -> StreamCollection<Endpoint> {
        StreamCollection::new()
    }
}
