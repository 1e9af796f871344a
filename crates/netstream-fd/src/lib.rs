//! The purpose of this crate is to hold the handful of platform calls that
//! `netstream` needs and that the standard library does not expose: probing
//! what kind of object a descriptor refers to, reading and changing its
//! blocking mode, asking how many bytes are waiting to be read, and waiting
//! for readiness on many descriptors at once.
//!
//! ## FileDescriptor
//!
//! `FileDescriptor` owns exactly one descriptor and closes it on drop.  It can
//! be built from anything that converts into an `OwnedFd` (files, sockets,
//! pipe ends) and implements `Read`, `Write` and `Seek`.
//!
//! ```
//! use netstream_fd::{DescriptorKind, FileDescriptor, Result};
//!
//! fn null_device_kind() -> Result<DescriptorKind> {
//!     let file = std::fs::File::open("/dev/null")?;
//!     FileDescriptor::new(file).kind()
//! }
//! # assert_eq!(null_device_kind().unwrap(), DescriptorKind::CharDevice);
//! ```
//!
//! ## Pipe
//! The `Pipe` type makes it more convenient to create a pipe and manage
//! the lifetime of both the read and write ends of that pipe.
//!
//! ```
//! use netstream_fd::{Pipe, Error};
//! use std::io::{Read, Write};
//!
//! let mut pipe = Pipe::new()?;
//! pipe.write.write(b"hello")?;
//! drop(pipe.write);
//!
//! let mut s = String::new();
//! pipe.read.read_to_string(&mut s)?;
//! assert_eq!(s, "hello");
//! # Ok::<(), Error>(())
//! ```
//!
//! ## Polling
//! `poll` is a very thin wrapper around `poll(2)`.  It is the readiness
//! primitive behind the stream collection's `wait_read`.
//!
//! ```
//! use netstream_fd::*;
//! use std::os::fd::AsRawFd;
//! use std::time::Duration;
//! use std::io::Write;
//!
//! let (a, mut b) = netstream_fd::socketpair()?;
//! let mut poll_array = [pollfd {
//!    fd: a.as_raw_fd(),
//!    events: POLLIN,
//!    revents: 0
//! }];
//! // sleeps for 20 milliseconds because `a` is not yet ready
//! assert_eq!(poll(&mut poll_array, Some(Duration::from_millis(20)))?, 0);
//!
//! b.write(b"hello")?;
//!
//! // Now a is ready for read
//! assert_eq!(poll(&mut poll_array, Some(Duration::from_millis(20)))?, 1);
//!
//! # Ok::<(), Error>(())
//! ```

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use crate::unix::*;

use thiserror::Error;
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to create a pipe")]
    Pipe(#[source] std::io::Error),
    #[error("failed to create a socketpair")]
    Socketpair(#[source] std::io::Error),
    #[error("fstat of fd {fd} failed")]
    Fstat { fd: i64, source: std::io::Error },
    #[error("fcntl read failed")]
    Fcntl(#[source] std::io::Error),
    #[error("failed to set cloexec")]
    Cloexec(#[source] std::io::Error),
    #[error("failed to change non-blocking mode")]
    NonBlocking(#[source] std::io::Error),
    #[error("failed to query pending byte count")]
    Fionread(#[source] std::io::Error),
    #[error("poll failed")]
    Poll(#[source] std::io::Error),
    #[error("dup of fd {fd} failed")]
    Dup { fd: i64, source: std::io::Error },

    #[error("IoError")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// What kind of object a descriptor refers to, as reported by `fstat(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    File,
    Directory,
    Fifo,
    Socket,
    CharDevice,
    BlockDevice,
    Other,
}

impl DescriptorKind {
    /// Directories (and anything we cannot classify) cannot be used as a
    /// byte stream.
    pub fn is_stream(self) -> bool {
        !matches!(self, Self::Directory | Self::Other)
    }
}

/// The access mode a descriptor was opened with, from `fcntl(F_GETFL)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessMode {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub non_blocking: bool,
}

/// Represents the readable and writable ends of a pair of descriptors
/// connected via a kernel pipe.
///
/// ```
/// use netstream_fd::{Pipe, Error};
/// use std::io::{Read,Write};
///
/// let mut pipe = Pipe::new()?;
/// pipe.write.write(b"hello")?;
/// drop(pipe.write);
///
/// let mut s = String::new();
/// pipe.read.read_to_string(&mut s)?;
/// assert_eq!(s, "hello");
/// # Ok::<(), Error>(())
/// ```
pub struct Pipe {
    /// The readable end of the pipe
    pub read: FileDescriptor,
    /// The writable end of the pipe
    pub write: FileDescriptor,
}

use std::time::Duration;

/// Examines a set of descriptors to see if some of them are ready for I/O,
/// or if certain events have occurred on them.
///
/// If `duration` is `None`, then `poll` will block until any of the requested
/// events are ready.  Otherwise, `duration` specifies how long to wait for
/// readiness before giving up.  `poll(2)` counts in milliseconds, so a
/// duration with a sub-millisecond remainder is rounded up; a zero duration
/// checks once and returns immediately.
///
/// The return value is the number of entries that were satisfied; `0` means
/// that none were ready after waiting for the specified duration.
///
/// The `pfd` array is mutated and the `revents` field is updated to indicate
/// which of the events were received.
pub fn poll(pfd: &mut [pollfd], duration: Option<Duration>) -> Result<usize> {
    poll_impl(pfd, duration)
}

/// Create a pair of connected sockets
///
/// This implementation creates a pair of SOCK_STREAM unix domain sockets.
pub fn socketpair() -> Result<(FileDescriptor, FileDescriptor)> {
    socketpair_impl()
}
