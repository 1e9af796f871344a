use crate::{AccessMode, DescriptorKind, Error, Pipe, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::net::Shutdown;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::time::Duration;

pub use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, pollfd};

/// `FileDescriptor` is a thin wrapper on top of an owned descriptor.
/// It closes the descriptor when it is dropped and exposes the queries
/// that the stream layer uses to decide what an arbitrary descriptor
/// is capable of.
#[derive(Debug)]
pub struct FileDescriptor {
    file: File,
}

impl FileDescriptor {
    /// Take ownership of anything that can be turned into an `OwnedFd`.
    pub fn new<F: Into<OwnedFd>>(f: F) -> Self {
        Self {
            file: File::from(f.into()),
        }
    }

    /// Attempt to duplicate the underlying descriptor so that it can be
    /// used by another part of the program.  Both the original and the
    /// copy refer to the same open file description.
    pub fn try_clone(&self) -> Result<Self> {
        let fd = self.as_raw_fd();
        self.file
            .try_clone()
            .map(|file| Self { file })
            .map_err(|source| Error::Dup {
                fd: fd.into(),
                source,
            })
    }

    /// Classify the descriptor with `fstat(2)`.
    pub fn kind(&self) -> Result<DescriptorKind> {
        let meta = self.file.metadata().map_err(|source| Error::Fstat {
            fd: self.as_raw_fd().into(),
            source,
        })?;
        let ft = meta.file_type();
        let kind = if ft.is_file() {
            DescriptorKind::File
        } else if ft.is_dir() {
            DescriptorKind::Directory
        } else if ft.is_fifo() {
            DescriptorKind::Fifo
        } else if ft.is_socket() {
            DescriptorKind::Socket
        } else if ft.is_char_device() {
            DescriptorKind::CharDevice
        } else if ft.is_block_device() {
            DescriptorKind::BlockDevice
        } else {
            DescriptorKind::Other
        };
        Ok(kind)
    }

    fn status_flags(&self) -> Result<libc::c_int> {
        let flags = unsafe { libc::fcntl(self.as_raw_fd(), libc::F_GETFL) };
        if flags == -1 {
            Err(Error::Fcntl(std::io::Error::last_os_error()))
        } else {
            Ok(flags)
        }
    }

    /// Report the access mode the descriptor was opened with.
    pub fn access_mode(&self) -> Result<AccessMode> {
        let flags = self.status_flags()?;
        let acc = flags & libc::O_ACCMODE;
        Ok(AccessMode {
            read: acc == libc::O_RDONLY || acc == libc::O_RDWR,
            write: acc == libc::O_WRONLY || acc == libc::O_RDWR,
            append: flags & libc::O_APPEND != 0,
            non_blocking: flags & libc::O_NONBLOCK != 0,
        })
    }

    pub fn is_non_blocking(&self) -> Result<bool> {
        Ok(self.status_flags()? & libc::O_NONBLOCK != 0)
    }

    /// Put the descriptor into (or take it out of) non-blocking mode.
    /// This changes the open file description, so duplicates observe
    /// the change too.
    pub fn set_non_blocking(&self, non_blocking: bool) -> Result<()> {
        let flags = self.status_flags()?;
        let wanted = if non_blocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        if wanted == flags {
            return Ok(());
        }
        let res = unsafe { libc::fcntl(self.as_raw_fd(), libc::F_SETFL, wanted) };
        if res == -1 {
            Err(Error::NonBlocking(std::io::Error::last_os_error()))
        } else {
            Ok(())
        }
    }

    /// A descriptor is seekable when `lseek(fd, 0, SEEK_CUR)` succeeds.
    pub fn is_seekable(&self) -> bool {
        (&self.file).seek(SeekFrom::Current(0)).is_ok()
    }

    /// Length of a regular file; `None` for anything whose size is unknown.
    pub fn file_size(&self) -> Result<Option<u64>> {
        if self.kind()? == DescriptorKind::File {
            Ok(Some(self.file.metadata()?.len()))
        } else {
            Ok(None)
        }
    }

    /// Number of bytes that can be read without blocking.
    ///
    /// For regular files this is the distance from the current position to
    /// the end of the file; everything else is asked via `FIONREAD`.
    pub fn pending_bytes(&self) -> Result<usize> {
        if self.kind()? == DescriptorKind::File {
            let len = self.file.metadata()?.len();
            let pos = (&self.file).stream_position()?;
            return Ok(len.saturating_sub(pos) as usize);
        }
        let mut count: libc::c_int = 0;
        let res = unsafe { libc::ioctl(self.as_raw_fd(), libc::FIONREAD, &mut count) };
        if res == -1 {
            Err(Error::Fionread(std::io::Error::last_os_error()))
        } else {
            Ok(count.max(0) as usize)
        }
    }

    /// Look at pending socket data without consuming it and without
    /// blocking, regardless of the descriptor's blocking mode.
    /// Returns `Ok(0)` when the peer has performed an orderly shutdown.
    pub fn peek(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let res = unsafe {
            libc::recv(
                self.as_raw_fd(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                libc::MSG_PEEK | libc::MSG_DONTWAIT,
            )
        };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res as usize)
        }
    }

    /// Shut down one or both directions of a socket.
    pub fn shutdown(&self, how: Shutdown) -> std::io::Result<()> {
        let how = match how {
            Shutdown::Read => libc::SHUT_RD,
            Shutdown::Write => libc::SHUT_WR,
            Shutdown::Both => libc::SHUT_RDWR,
        };
        let res = unsafe { libc::shutdown(self.as_raw_fd(), how) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn set_cloexec(&self) -> Result<()> {
        let fd = self.as_raw_fd();
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        if flags == -1 {
            return Err(Error::Cloexec(std::io::Error::last_os_error()));
        }
        let res = unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
        if res == -1 {
            Err(Error::Cloexec(std::io::Error::last_os_error()))
        } else {
            Ok(())
        }
    }
}

impl Read for FileDescriptor {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for FileDescriptor {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileDescriptor {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

impl AsFd for FileDescriptor {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for FileDescriptor {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl IntoRawFd for FileDescriptor {
    fn into_raw_fd(self) -> RawFd {
        self.file.into_raw_fd()
    }
}

impl From<FileDescriptor> for OwnedFd {
    fn from(fd: FileDescriptor) -> Self {
        fd.file.into()
    }
}

impl From<OwnedFd> for FileDescriptor {
    fn from(fd: OwnedFd) -> Self {
        Self::new(fd)
    }
}

impl Pipe {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Result<Pipe> {
        let mut fds = [-1 as libc::c_int; 2];
        let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if res == -1 {
            return Err(Error::Pipe(std::io::Error::last_os_error()));
        }
        // SAFETY: pipe(2) succeeded, so both descriptors are open and owned
        // by nobody else.
        let read = FileDescriptor::new(unsafe { OwnedFd::from_raw_fd(fds[0]) });
        let write = FileDescriptor::new(unsafe { OwnedFd::from_raw_fd(fds[1]) });
        read.set_cloexec()?;
        write.set_cloexec()?;
        Ok(Pipe { read, write })
    }
}

pub(crate) fn socketpair_impl() -> Result<(FileDescriptor, FileDescriptor)> {
    let (a, b) = std::os::unix::net::UnixStream::pair().map_err(Error::Socketpair)?;
    Ok((FileDescriptor::new(a), FileDescriptor::new(b)))
}

/// Convert an optional wait into the millisecond argument of `poll(2)`,
/// rounding any sub-millisecond remainder up.
pub(crate) fn timeout_millis(duration: Option<Duration>) -> libc::c_int {
    match duration {
        None => -1,
        Some(d) => {
            let ms = d.as_micros().div_ceil(1000);
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

pub(crate) fn poll_impl(pfd: &mut [pollfd], duration: Option<Duration>) -> Result<usize> {
    let poll_result = unsafe {
        libc::poll(
            pfd.as_mut_ptr(),
            pfd.len() as libc::nfds_t,
            timeout_millis(duration),
        )
    };
    if poll_result < 0 {
        Err(Error::Poll(std::io::Error::last_os_error()))
    } else {
        Ok(poll_result as usize)
    }
}
