//! Capability-gated stream over one owned handle.
//!
//! A [`Stream`] computes its readable/writable flags once, from the open
//! mode of the handle it was built from, and its seekable flag from the
//! platform. Every data operation checks that the handle is still present
//! and that the relevant capability is set before touching the platform.
//!
//! Lifecycle:
//!
//! ```text
//! Open ──close()──> Closed
//!   └───detach()──> Detached (handle returned to caller)
//! ```
//!
//! Both terminal states clear all capability flags, and calling `close()` or
//! `detach()` again is a no-op.

use crate::capture::capture;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::metadata::Metadata;
use crate::mode;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::OwnedFd;
use tracing::{debug, warn};

/// Largest single platform read. `read(length)` may return fewer bytes than
/// asked for, so larger requests are served one chunk at a time.
pub(crate) const READ_CHUNK: usize = 64 * 1024;

/// The minimal read/write/seek/metadata contract shared by every stream.
pub trait ByteStream {
    /// Release the handle and clear all capabilities. Idempotent.
    fn close(&mut self);

    /// Hand the handle back to the caller. `None` once released.
    fn detach(&mut self) -> Option<Handle>;

    fn get_metadata(&self) -> Option<Metadata>;

    fn get_metadata_value(&self, key: &str) -> Option<serde_json::Value> {
        self.get_metadata()?.get(key)
    }

    fn tell(&mut self) -> Result<u64>;

    /// True when there is no handle or the handle reports end-of-stream.
    fn eof(&self) -> bool;

    /// Read up to `length` bytes. Fewer bytes are allowed, never more.
    fn read(&mut self, length: usize) -> Result<Vec<u8>>;

    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Size in bytes, or `None` when released or unknown.
    fn get_size(&self) -> Option<u64>;

    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    fn rewind(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// All remaining bytes from the current position.
    fn get_contents(&mut self) -> Result<Vec<u8>>;

    fn is_readable(&self) -> bool;

    fn is_writable(&self) -> bool;

    fn is_seekable(&self) -> bool;

    /// Best-effort full contents as text.
    ///
    /// Rewinds when seekable, then reads to the end. Any failure is logged
    /// and yields an empty string; this never returns an error.
    fn to_string_lossy(&mut self) -> String {
        let result = if self.is_seekable() {
            self.rewind().and_then(|()| self.get_contents())
        } else {
            self.get_contents()
        };
        match result {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                warn!(error = %err, code = err.code(), "stream could not be converted to a string");
                String::new()
            }
        }
    }
}

#[derive(Debug)]
pub struct Stream {
    handle: Option<Handle>,
    readable: bool,
    writable: bool,
    seekable: bool,
}

impl Stream {
    /// Wrap a handle.
    ///
    /// Fails with [`Error::InvalidHandle`] when the handle does not refer to
    /// something that can be used as a byte stream (a directory, say).
    pub fn new(handle: Handle) -> Result<Self> {
        if !handle.kind().is_stream() {
            return Err(Error::InvalidHandle(format!(
                "descriptor of kind {:?} is not a stream",
                handle.kind()
            )));
        }
        let caps = mode::capabilities(handle.mode());
        let seekable = handle.fd().is_seekable();
        debug!(
            mode = handle.mode(),
            stream_type = %handle.stream_type(),
            readable = caps.readable,
            writable = caps.writable,
            seekable,
            "stream opened"
        );
        Ok(Self {
            handle: Some(handle),
            readable: caps.readable,
            writable: caps.writable,
            seekable,
        })
    }

    /// Adopt a raw descriptor, deriving its mode from the platform.
    pub fn from_fd<F: Into<OwnedFd>>(fd: F) -> Result<Self> {
        Self::new(Handle::new(fd)?)
    }

    pub fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }

    pub(crate) fn handle_mut(&mut self) -> Option<&mut Handle> {
        self.handle.as_mut()
    }

    fn clear_capabilities(&mut self) {
        self.readable = false;
        self.writable = false;
        self.seekable = false;
    }

    pub(crate) fn set_readable(&mut self, readable: bool) {
        self.readable = readable;
    }

    pub(crate) fn set_writable(&mut self, writable: bool) {
        self.writable = writable;
    }

    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(stream_type = %handle.stream_type(), "stream closed");
        }
        self.clear_capabilities();
    }

    pub fn detach(&mut self) -> Option<Handle> {
        let handle = self.handle.take();
        self.clear_capabilities();
        handle
    }

    pub fn get_metadata(&self) -> Option<Metadata> {
        self.handle.as_ref().map(Handle::metadata)
    }

    pub fn get_metadata_value(&self, key: &str) -> Option<serde_json::Value> {
        self.get_metadata()?.get(key)
    }

    pub fn tell(&mut self) -> Result<u64> {
        let handle = self.handle.as_mut().ok_or(Error::StreamDetached)?;
        capture(|| handle.fd_mut().stream_position(), |e| {
            Err(Error::TellFailed(e))
        })
    }

    pub fn eof(&self) -> bool {
        self.handle.as_ref().is_none_or(Handle::at_eof)
    }

    pub fn read(&mut self, length: usize) -> Result<Vec<u8>> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::StreamDetached);
        };
        if !self.readable {
            return Err(Error::NotReadable);
        }
        let mut buf = vec![0u8; length.min(READ_CHUNK)];
        let n = read_once(handle, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Write the whole buffer in blocking mode. A non-blocking handle stops
    /// at the first would-block and the partial count is returned.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::StreamDetached);
        };
        if !self.writable {
            return Err(Error::NotWritable);
        }
        let mut written = 0;
        while written < data.len() {
            match handle.fd_mut().write(&data[written..]) {
                Ok(0) => {
                    return Err(Error::WriteFailed(io::ErrorKind::WriteZero.into()));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if handle.timeout().is_some() {
                        handle.set_timed_out(true);
                    }
                    break;
                }
                Err(e) => return Err(Error::WriteFailed(e)),
            }
        }
        Ok(written)
    }

    pub fn get_size(&self) -> Option<u64> {
        self.handle.as_ref()?.fd().file_size().ok().flatten()
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::StreamDetached);
        };
        if !self.seekable {
            return Err(Error::NotSeekable);
        }
        let offset = capture(|| handle.fd_mut().seek(pos), |e| Err(Error::SeekFailed(e)))?;
        handle.set_eof(false);
        Ok(offset)
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    pub fn get_contents(&mut self) -> Result<Vec<u8>> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::StreamDetached);
        };
        if !self.readable {
            return Err(Error::NotReadable);
        }
        let mut contents = Vec::new();
        match handle.fd_mut().read_to_end(&mut contents) {
            Ok(_) => handle.set_eof(true),
            // a non-blocking handle hands back what was already there
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(Error::ReadFailed(e)),
        }
        Ok(contents)
    }

    pub fn to_string_lossy(&mut self) -> String {
        ByteStream::to_string_lossy(self)
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable
    }
}

/// One platform read into `buf`, retrying on interruption.
///
/// Would-block (non-blocking mode or an expired socket timeout) is not an
/// error: it yields zero bytes and marks the handle timed out when a timeout
/// was configured. A zero-length read for a non-empty buffer marks eof.
pub(crate) fn read_once(handle: &mut Handle, buf: &mut [u8]) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    loop {
        match handle.fd_mut().read(buf) {
            Ok(0) => {
                handle.set_eof(true);
                return Ok(0);
            }
            Ok(n) => {
                handle.set_timed_out(false);
                return Ok(n);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if handle.timeout().is_some() {
                    handle.set_timed_out(true);
                }
                return Ok(0);
            }
            Err(e) => return Err(Error::ReadFailed(e)),
        }
    }
}

impl ByteStream for Stream {
    fn close(&mut self) {
        Stream::close(self);
    }

    fn detach(&mut self) -> Option<Handle> {
        Stream::detach(self)
    }

    fn get_metadata(&self) -> Option<Metadata> {
        Stream::get_metadata(self)
    }

    fn tell(&mut self) -> Result<u64> {
        Stream::tell(self)
    }

    fn eof(&self) -> bool {
        Stream::eof(self)
    }

    fn read(&mut self, length: usize) -> Result<Vec<u8>> {
        Stream::read(self, length)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Stream::write(self, data)
    }

    fn get_size(&self) -> Option<u64> {
        Stream::get_size(self)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Stream::seek(self, pos)
    }

    fn get_contents(&mut self) -> Result<Vec<u8>> {
        Stream::get_contents(self)
    }

    fn is_readable(&self) -> bool {
        self.readable
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn is_seekable(&self) -> bool {
        self.seekable
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::StreamDetached.into());
        };
        if !self.readable {
            return Err(Error::NotReadable.into());
        }
        Ok(read_once(handle, buf)?)
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(Stream::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.handle.as_mut() {
            Some(handle) => handle.fd_mut().flush(),
            None => Err(Error::StreamDetached.into()),
        }
    }
}

impl Seek for Stream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(Stream::seek(self, pos)?)
    }
}
