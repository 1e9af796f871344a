//! Socket operations layered on a [`Stream`].
//!
//! `SocketStream` owns a `Stream` and forwards the byte-stream contract to
//! it, adding peer naming, blocking and timeout control, line reads and
//! half-close. Half-close only ever clears one capability flag; the handle
//! stays open until `close()` or `detach()`.

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::metadata::Metadata;
use crate::stream::{ByteStream, Stream, read_once};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::net::Shutdown;
use std::os::fd::OwnedFd;
use std::time::Duration;
use tracing::debug;

/// Most bytes inspected per peek while looking for a line end.
const LINE_CHUNK: usize = 4096;

/// How many queued bytes to consume for the current line: up to and
/// including the first `\n` among the next `want` bytes. `Some(0)` means the
/// peer has shut down; `None` means nothing is queued or the handle is not a
/// socket.
fn queued_line_len(handle: &Handle, want: usize) -> Option<usize> {
    if !handle.is_socket() {
        return None;
    }
    let mut peeked = vec![0u8; want];
    let n = handle.fd().peek(&mut peeked).ok()?;
    Some(
        peeked[..n]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(n, |i| i + 1),
    )
}

#[derive(Debug)]
pub struct SocketStream {
    inner: Stream,
}

impl SocketStream {
    pub fn new(handle: Handle) -> Result<Self> {
        Ok(Self {
            inner: Stream::new(handle)?,
        })
    }

    pub fn from_fd<F: Into<OwnedFd>>(fd: F) -> Result<Self> {
        Self::new(Handle::new(fd)?)
    }

    pub fn as_stream(&self) -> &Stream {
        &self.inner
    }

    pub fn into_stream(self) -> Stream {
        self.inner
    }

    fn handle(&self) -> Result<&Handle> {
        self.inner.handle().ok_or(Error::StreamDetached)
    }

    // ---------- socket operations ----------

    /// Address of the connected peer; empty when unnamed or not a socket.
    pub fn get_remote_name(&self) -> Result<String> {
        Ok(self.handle()?.socket_name(true))
    }

    /// Local address; empty when unnamed or not a socket.
    pub fn get_local_name(&self) -> Result<String> {
        Ok(self.handle()?.socket_name(false))
    }

    /// `"stream"` while a handle is held, empty once released.
    pub fn get_resource_type(&self) -> &'static str {
        if self.inner.handle().is_some() {
            "stream"
        } else {
            ""
        }
    }

    /// Blocking state as reported by the metadata; `None` once released.
    pub fn is_blocking(&self) -> Option<bool> {
        self.inner.get_metadata().map(|meta| meta.blocked)
    }

    pub fn set_blocking(&mut self, enable: bool) -> Result<bool> {
        Ok(self.handle()?.set_blocking(enable).is_ok())
    }

    /// Set the read/write timeout. Zero clears it. Returns `false` for
    /// handles that are not sockets.
    pub fn set_timeout(&mut self, seconds: u64, microseconds: u32) -> Result<bool> {
        let handle = self.inner.handle_mut().ok_or(Error::StreamDetached)?;
        if !handle.is_socket() {
            return Ok(false);
        }
        let Some(timeout) = Duration::from_secs(seconds)
            .checked_add(Duration::from_micros(u64::from(microseconds)))
        else {
            debug!(seconds, microseconds, "socket timeout out of range");
            return Ok(false);
        };
        let timeout = (!timeout.is_zero()).then_some(timeout);
        match handle.set_timeout(timeout) {
            Ok(()) => Ok(true),
            Err(err) => {
                debug!(error = %err, "setting socket timeout failed");
                Ok(false)
            }
        }
    }

    /// Read up to and including the next `\n`, or `max_length` bytes,
    /// whichever comes first.
    ///
    /// Returns `None` at end-of-stream, or when a non-blocking handle has
    /// nothing available.
    pub fn read_line(&mut self, max_length: usize) -> Result<Option<Vec<u8>>> {
        let readable = self.inner.is_readable();
        let handle = self.inner.handle_mut().ok_or(Error::StreamDetached)?;
        if !readable {
            return Err(Error::NotReadable);
        }
        let mut line = Vec::new();
        while line.len() < max_length {
            let want = (max_length - line.len()).min(LINE_CHUNK);
            let take = match queued_line_len(handle, want) {
                Some(0) => {
                    handle.set_eof(true);
                    break;
                }
                Some(n) => n,
                // nothing queued yet: one byte, which blocks in blocking mode
                None => 1,
            };
            let start = line.len();
            line.resize(start + take, 0);
            let n = read_once(handle, &mut line[start..])?;
            line.truncate(start + n);
            if n == 0 || line[start..].contains(&b'\n') {
                break;
            }
        }
        if line.is_empty() && max_length > 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// Stop reading. Sockets are shut down for reading; any other handle
    /// only loses its readable flag.
    pub fn close_read(&mut self) -> Result<()> {
        let handle = self.handle()?;
        if handle.is_socket() {
            if let Err(err) = handle.shutdown(Shutdown::Read) {
                debug!(error = %err, "read shutdown failed");
            }
        }
        self.inner.set_readable(false);
        Ok(())
    }

    /// Stop writing. Sockets are shut down for writing, which signals
    /// end-of-stream to the peer.
    pub fn close_write(&mut self) -> Result<()> {
        let handle = self.handle()?;
        if handle.is_socket() {
            if let Err(err) = handle.shutdown(Shutdown::Write) {
                debug!(error = %err, "write shutdown failed");
            }
        }
        self.inner.set_writable(false);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_readable() || self.inner.is_writable()
    }

    // ---------- byte stream ----------

    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn detach(&mut self) -> Option<Handle> {
        self.inner.detach()
    }

    pub fn get_metadata(&self) -> Option<Metadata> {
        self.inner.get_metadata()
    }

    pub fn get_metadata_value(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.get_metadata_value(key)
    }

    pub fn tell(&mut self) -> Result<u64> {
        self.inner.tell()
    }

    pub fn eof(&self) -> bool {
        self.inner.eof()
    }

    pub fn read(&mut self, length: usize) -> Result<Vec<u8>> {
        self.inner.read(length)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.inner.write(data)
    }

    pub fn get_size(&self) -> Option<u64> {
        self.inner.get_size()
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.inner.seek(pos)
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.inner.rewind()
    }

    pub fn get_contents(&mut self) -> Result<Vec<u8>> {
        self.inner.get_contents()
    }

    pub fn to_string_lossy(&mut self) -> String {
        self.inner.to_string_lossy()
    }

    pub fn is_readable(&self) -> bool {
        self.inner.is_readable()
    }

    pub fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }

    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }
}

impl From<Stream> for SocketStream {
    fn from(inner: Stream) -> Self {
        Self { inner }
    }
}

impl ByteStream for SocketStream {
    fn close(&mut self) {
        self.inner.close();
    }

    fn detach(&mut self) -> Option<Handle> {
        self.inner.detach()
    }

    fn get_metadata(&self) -> Option<Metadata> {
        self.inner.get_metadata()
    }

    fn tell(&mut self) -> Result<u64> {
        self.inner.tell()
    }

    fn eof(&self) -> bool {
        self.inner.eof()
    }

    fn read(&mut self, length: usize) -> Result<Vec<u8>> {
        self.inner.read(length)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.inner.write(data)
    }

    fn get_size(&self) -> Option<u64> {
        self.inner.get_size()
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.inner.seek(pos)
    }

    fn get_contents(&mut self) -> Result<Vec<u8>> {
        self.inner.get_contents()
    }

    fn is_readable(&self) -> bool {
        self.inner.is_readable()
    }

    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }

    fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.inner, buf)
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(&mut self.inner, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.inner)
    }
}

impl Seek for SocketStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(&mut self.inner, pos)
    }
}
