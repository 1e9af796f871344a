//! Owned OS handles.
//!
//! A [`Handle`] is one owned descriptor together with the properties the
//! platform reports for it: its open mode, transport type, originating URI
//! and the end-of-stream / timed-out state observed by the last operation.
//! Handles move between owners; they are never shared.

use crate::error::{Error, Result};
use crate::metadata::{Metadata, StreamType};
use crate::mode;
use netstream_fd::{DescriptorKind, FileDescriptor};
use socket2::{Domain, SockRef, Type};
use std::fs::File;
use std::io;
use std::net::Shutdown;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::time::Duration;

#[derive(Debug)]
pub struct Handle {
    fd: FileDescriptor,
    kind: DescriptorKind,
    mode: String,
    stream_type: StreamType,
    wrapper_type: Option<String>,
    uri: Option<String>,
    eof: bool,
    timed_out: bool,
    timeout: Option<Duration>,
}

impl Handle {
    /// Adopt an arbitrary descriptor.
    ///
    /// Sockets are always opened `r+`; for everything else the open mode is
    /// reconstructed from the descriptor's access mode.
    pub fn new<F: Into<OwnedFd>>(f: F) -> Result<Self> {
        let fd = FileDescriptor::new(f);
        let kind = fd
            .kind()
            .map_err(|err| Error::InvalidHandle(err.to_string()))?;
        let (mode, stream_type) = if kind == DescriptorKind::Socket {
            ("r+".to_string(), socket_type(&fd))
        } else {
            let access = fd.access_mode()?;
            (
                mode::from_access_mode(access).to_string(),
                StreamType::Stdio,
            )
        };
        let wrapper_type = (kind == DescriptorKind::File).then(|| "plainfile".to_string());
        Ok(Self {
            fd,
            kind,
            mode,
            stream_type,
            wrapper_type,
            uri: None,
            eof: false,
            timed_out: false,
            timeout: None,
        })
    }

    /// Adopt a file that was opened with a known mode.
    pub fn from_file(file: File, mode: &str) -> Result<Self> {
        Ok(Self::new(file)?.with_mode(mode))
    }

    /// Wrap a freshly created socket. The caller vouches for the type.
    pub(crate) fn from_socket<F: Into<OwnedFd>>(
        socket: F,
        stream_type: StreamType,
        uri: Option<String>,
    ) -> Self {
        Self {
            fd: FileDescriptor::new(socket),
            kind: DescriptorKind::Socket,
            mode: "r+".to_string(),
            stream_type,
            wrapper_type: None,
            uri,
            eof: false,
            timed_out: false,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = mode.to_string();
        self
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_stream_type(mut self, stream_type: StreamType) -> Self {
        self.stream_type = stream_type;
        self
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn is_socket(&self) -> bool {
        self.kind == DescriptorKind::Socket
    }

    pub fn fd(&self) -> &FileDescriptor {
        &self.fd
    }

    pub(crate) fn fd_mut(&mut self) -> &mut FileDescriptor {
        &mut self.fd
    }

    /// Duplicate the descriptor. The copy shares the open file description
    /// (and so the file offset and blocking flag) but starts with fresh
    /// eof/timed-out state.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            fd: self.fd.try_clone()?,
            kind: self.kind,
            mode: self.mode.clone(),
            stream_type: self.stream_type,
            wrapper_type: self.wrapper_type.clone(),
            uri: self.uri.clone(),
            eof: false,
            timed_out: false,
            timeout: self.timeout,
        })
    }

    pub fn into_fd(self) -> FileDescriptor {
        self.fd
    }

    pub fn is_blocking(&self) -> Result<bool> {
        Ok(!self.fd.is_non_blocking()?)
    }

    pub fn set_blocking(&self, blocking: bool) -> Result<()> {
        Ok(self.fd.set_non_blocking(!blocking)?)
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Apply a read/write timeout to a socket. `None` clears it.
    pub(crate) fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let sock = SockRef::from(&self.fd);
        sock.set_read_timeout(timeout)?;
        sock.set_write_timeout(timeout)?;
        self.timeout = timeout;
        Ok(())
    }

    pub(crate) fn set_eof(&mut self, eof: bool) {
        self.eof = eof;
    }

    pub(crate) fn set_timed_out(&mut self, timed_out: bool) {
        self.timed_out = timed_out;
    }

    /// End of stream: the last read returned nothing, or for a socket the
    /// peer has shut down and no data is left to read.
    pub fn at_eof(&self) -> bool {
        if self.eof {
            return true;
        }
        if self.is_socket() && self.stream_type != StreamType::UdpSocket {
            let mut byte = [0u8; 1];
            return matches!(self.fd.peek(&mut byte), Ok(0));
        }
        false
    }

    pub(crate) fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.fd.shutdown(how)
    }

    /// Local or peer address of a socket as a string; empty when the handle
    /// is not a socket or the address is unnamed.
    pub(crate) fn socket_name(&self, peer: bool) -> String {
        if !self.is_socket() {
            return String::new();
        }
        let sock = SockRef::from(&self.fd);
        let addr = if peer {
            sock.peer_addr()
        } else {
            sock.local_addr()
        };
        let Ok(addr) = addr else {
            return String::new();
        };
        if let Some(inet) = addr.as_socket() {
            return inet.to_string();
        }
        self.unix_name(peer).unwrap_or_default()
    }

    fn unix_name(&self, peer: bool) -> Option<String> {
        let dup = self.fd.try_clone().ok()?;
        let stream = std::os::unix::net::UnixStream::from(OwnedFd::from(dup));
        let addr = if peer {
            stream.peer_addr()
        } else {
            stream.local_addr()
        };
        addr.ok()?
            .as_pathname()
            .map(|path| path.display().to_string())
    }

    pub fn metadata(&self) -> Metadata {
        Metadata {
            timed_out: self.timed_out,
            blocked: self.is_blocking().unwrap_or(true),
            eof: self.eof,
            wrapper_type: self.wrapper_type.clone(),
            stream_type: self.stream_type,
            mode: self.mode.clone(),
            unread_bytes: self.fd.pending_bytes().unwrap_or(0),
            seekable: self.fd.is_seekable(),
            uri: self.uri.clone(),
        }
    }
}

fn socket_type(fd: &FileDescriptor) -> StreamType {
    let sock = SockRef::from(fd);
    let unix = sock.domain().is_ok_and(|domain| domain == Domain::UNIX);
    let dgram = sock.r#type().is_ok_and(|ty| ty == Type::DGRAM);
    match (unix, dgram) {
        (true, true) => StreamType::UdgSocket,
        (true, false) => StreamType::UnixSocket,
        (false, true) => StreamType::UdpSocket,
        (false, false) => StreamType::TcpSocket,
    }
}

impl AsFd for Handle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for Handle {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl From<Handle> for OwnedFd {
    fn from(handle: Handle) -> Self {
        handle.fd.into()
    }
}
