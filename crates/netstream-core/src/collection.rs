//! Keyed readiness multiplexer.
//!
//! A [`StreamCollection`] owns a keyed, insertion-ordered set of members and
//! answers "which of these can be read (or written) without blocking?". It
//! runs no loop of its own: the caller polls it, then services the keys it
//! reported through [`StreamCollection::get_mut`].
//!
//! Members only need to implement [`Selectable`]. [`Endpoint`] lets one
//! collection hold servers, sockets and plain streams side by side.
//!
//! ```no_run
//! use netstream_core::{Endpoint, ServerFlags, SocketServer, StreamCollection};
//! use std::time::Duration;
//!
//! let mut server = SocketServer::new("tcp://127.0.0.1:8000", ServerFlags::default())?;
//! server.set_blocking(false)?;
//!
//! let mut collection: StreamCollection<Endpoint> = StreamCollection::new();
//! collection.attach(server.into(), Some("server"))?;
//! for key in collection.wait_read(Duration::from_millis(250))? {
//!     println!("{key} is ready");
//! }
//! # Ok::<(), netstream_core::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::poll::{READ_READY, WRITE_READY, interest, poll_until};
use crate::server::SocketServer;
use crate::socket_stream::SocketStream;
use crate::stream::Stream;
use std::collections::HashMap;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;
use tracing::trace;

/// What the multiplexer needs to know about a member.
pub trait Selectable {
    /// Descriptor to poll; `None` once the member released its handle.
    fn selectable_fd(&self) -> Option<RawFd>;

    /// Include this member when asking for read readiness.
    fn wants_read(&self) -> bool;

    /// Include this member when asking for write readiness.
    fn wants_write(&self) -> bool;
}

impl<T: Selectable + ?Sized> Selectable for &T {
    fn selectable_fd(&self) -> Option<RawFd> {
        (**self).selectable_fd()
    }

    fn wants_read(&self) -> bool {
        (**self).wants_read()
    }

    fn wants_write(&self) -> bool {
        (**self).wants_write()
    }
}

impl<T: Selectable + ?Sized> Selectable for Box<T> {
    fn selectable_fd(&self) -> Option<RawFd> {
        (**self).selectable_fd()
    }

    fn wants_read(&self) -> bool {
        (**self).wants_read()
    }

    fn wants_write(&self) -> bool {
        (**self).wants_write()
    }
}

impl Selectable for Stream {
    fn selectable_fd(&self) -> Option<RawFd> {
        self.handle().map(AsRawFd::as_raw_fd)
    }

    fn wants_read(&self) -> bool {
        self.is_readable()
    }

    fn wants_write(&self) -> bool {
        self.is_writable()
    }
}

impl Selectable for SocketStream {
    fn selectable_fd(&self) -> Option<RawFd> {
        self.as_stream().selectable_fd()
    }

    fn wants_read(&self) -> bool {
        self.is_readable()
    }

    fn wants_write(&self) -> bool {
        self.is_writable()
    }
}

/// A server is read-ready when a connection is pending; it never writes.
impl Selectable for SocketServer {
    fn selectable_fd(&self) -> Option<RawFd> {
        self.handle().map(AsRawFd::as_raw_fd)
    }

    fn wants_read(&self) -> bool {
        !self.is_closed()
    }

    fn wants_write(&self) -> bool {
        false
    }
}

/// Any of the pollable objects this crate produces.
#[derive(Debug)]
pub enum Endpoint {
    Server(SocketServer),
    Socket(SocketStream),
    File(Stream),
}

impl Endpoint {
    pub fn as_server_mut(&mut self) -> Option<&mut SocketServer> {
        match self {
            Self::Server(server) => Some(server),
            _ => None,
        }
    }

    pub fn as_socket_mut(&mut self) -> Option<&mut SocketStream> {
        match self {
            Self::Socket(socket) => Some(socket),
            _ => None,
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut Stream> {
        match self {
            Self::File(stream) => Some(stream),
            _ => None,
        }
    }

    fn as_selectable(&self) -> &dyn Selectable {
        match self {
            Self::Server(server) => server,
            Self::Socket(socket) => socket,
            Self::File(stream) => stream,
        }
    }
}

impl Selectable for Endpoint {
    fn selectable_fd(&self) -> Option<RawFd> {
        self.as_selectable().selectable_fd()
    }

    fn wants_read(&self) -> bool {
        self.as_selectable().wants_read()
    }

    fn wants_write(&self) -> bool {
        self.as_selectable().wants_write()
    }
}

impl From<SocketServer> for Endpoint {
    fn from(server: SocketServer) -> Self {
        Self::Server(server)
    }
}

impl From<SocketStream> for Endpoint {
    fn from(socket: SocketStream) -> Self {
        Self::Socket(socket)
    }
}

impl From<Stream> for Endpoint {
    fn from(stream: Stream) -> Self {
        Self::File(stream)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

/// Keyed, insertion-ordered set of pollable members.
#[derive(Debug)]
pub struct StreamCollection<S = Endpoint> {
    members: Vec<(String, S)>,
    /// Descriptor of each open member to its key.
    index: HashMap<RawFd, String>,
    next_id: u64,
}

impl<S> Default for StreamCollection<S> {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            index: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<S: Selectable> StreamCollection<S> {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.members.iter().position(|(k, _)| k == key)
    }

    fn generate_key(&mut self) -> String {
        loop {
            let key = format!("@{}", self.next_id);
            self.next_id += 1;
            if self.position(&key).is_none() {
                return key;
            }
        }
    }

    /// Add `member` under `key`, or under a generated `@N` key when `key`
    /// is `None`. Returns the key used.
    pub fn attach(&mut self, member: S, key: Option<&str>) -> Result<String> {
        if let Some(key) = key {
            if self.position(key).is_some() {
                return Err(Error::DuplicateKey(key.to_string()));
            }
        }
        if let Some(fd) = member.selectable_fd() {
            if let Some(existing) = self.live_key(fd) {
                return Err(Error::DuplicateMember(existing.to_string()));
            }
        }
        let key = match key {
            Some(key) => key.to_string(),
            None => self.generate_key(),
        };
        if let Some(fd) = member.selectable_fd() {
            self.index.insert(fd, key.clone());
        }
        trace!(key = %key, "member attached");
        self.members.push((key.clone(), member));
        Ok(key)
    }

    /// Remove and return the member under `key`. An unknown key is not an
    /// error.
    pub fn detach(&mut self, key: &str) -> Option<S> {
        let pos = self.position(key)?;
        let (key, member) = self.members.remove(pos);
        self.index.retain(|_, k| *k != key);
        trace!(key = %key, "member detached");
        Some(member)
    }

    /// Key of the member that still holds `fd`. An index entry left behind
    /// by a member that closed its handle does not count: the descriptor
    /// number may since have been reused by an unrelated stream.
    fn live_key(&self, fd: RawFd) -> Option<&str> {
        let key = self.index.get(&fd)?;
        let pos = self.position(key)?;
        (self.members[pos].1.selectable_fd() == Some(fd)).then_some(key.as_str())
    }

    /// Remove the member registered with the same descriptor as `member`.
    pub fn detach_member<T: Selectable + ?Sized>(&mut self, member: &T) -> Option<S> {
        let fd = member.selectable_fd()?;
        match self.live_key(fd) {
            Some(key) => {
                let key = key.to_string();
                self.detach(&key)
            }
            None => {
                self.index.remove(&fd);
                None
            }
        }
    }

    /// Key under which a member with the same descriptor is registered.
    pub fn key_of<T: Selectable + ?Sized>(&self, member: &T) -> Option<&str> {
        self.live_key(member.selectable_fd()?)
    }

    pub fn get(&self, key: &str) -> Option<&S> {
        self.position(key).map(|i| &self.members[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut S> {
        self.position(key).map(|i| &mut self.members[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(k, _)| k.as_str())
    }

    /// `(key, member)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &S)> {
        self.members.iter().map(|(k, m)| (k.as_str(), m))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut S)> {
        self.members.iter_mut().map(|(k, m)| (k.as_str(), m))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn count(&self) -> usize {
        self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Keys of read-interested members that can be read without blocking.
    pub fn get_readable(&self) -> Result<Vec<String>> {
        self.ready(Direction::Read, Some(Duration::ZERO))
    }

    /// Keys of write-interested members that can be written without
    /// blocking.
    pub fn get_writable(&self) -> Result<Vec<String>> {
        self.ready(Direction::Write, Some(Duration::ZERO))
    }

    /// Block for up to `timeout` until at least one read-interested member
    /// is ready, and return the keys of those that are.
    ///
    /// An empty result is a pure timeout. A zero timeout polls once and
    /// returns immediately.
    pub fn wait_read(&self, timeout: Duration) -> Result<Vec<String>> {
        self.ready(Direction::Read, Some(timeout))
    }

    fn ready(&self, direction: Direction, timeout: Option<Duration>) -> Result<Vec<String>> {
        let (events, mask) = match direction {
            Direction::Read => (READ_READY, READ_READY),
            Direction::Write => (WRITE_READY, WRITE_READY),
        };
        let mut keys = Vec::new();
        let mut pfds = Vec::new();
        for (key, member) in &self.members {
            let interested = match direction {
                Direction::Read => member.wants_read(),
                Direction::Write => member.wants_write(),
            };
            if !interested {
                continue;
            }
            if let Some(fd) = member.selectable_fd() {
                keys.push(key.as_str());
                pfds.push(interest(fd, events));
            }
        }
        let n = poll_until(&mut pfds, timeout)?;
        trace!(?direction, candidates = pfds.len(), ready = n, "readiness poll");
        if n == 0 {
            return Ok(Vec::new());
        }
        Ok(keys
            .into_iter()
            .zip(&pfds)
            .filter(|(_, pfd)| pfd.revents & mask != 0)
            .map(|(key, _)| key.to_string())
            .collect())
    }
}

impl<'a, S> IntoIterator for &'a StreamCollection<S> {
    type Item = (&'a String, &'a S);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, S)>,
        fn(&'a (String, S)) -> (&'a String, &'a S),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter().map(|(k, m)| (k, m))
    }
}
