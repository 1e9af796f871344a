//! Bounded readiness waits shared by the server and the collection.

use crate::error::{Error, Result};
use netstream_fd::{POLLERR, POLLHUP, POLLIN, POLLOUT, pollfd};
use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// Events that count as "ready to read". Hang-up and error are included so
/// that a reader gets to observe end-of-stream or the failure.
pub(crate) const READ_READY: i16 = POLLIN | POLLHUP | POLLERR;
pub(crate) const WRITE_READY: i16 = POLLOUT | POLLERR;

pub(crate) fn interest(fd: RawFd, events: i16) -> pollfd {
    pollfd {
        fd,
        events,
        revents: 0,
    }
}

/// `poll(2)` that retries on `EINTR` against whatever is left of the
/// budget. `None` waits indefinitely; a zero budget polls exactly once.
pub(crate) fn poll_until(pfds: &mut [pollfd], timeout: Option<Duration>) -> Result<usize> {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        match netstream_fd::poll(pfds, remaining) {
            Ok(n) => return Ok(n),
            Err(netstream_fd::Error::Poll(err)) if err.kind() == io::ErrorKind::Interrupted => {
                if remaining.is_some_and(|r| r.is_zero()) {
                    return Ok(0);
                }
            }
            Err(netstream_fd::Error::Poll(err)) => return Err(Error::PollFailed(err)),
            Err(other) => return Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn zero_budget_returns_immediately() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut pfds = [interest(a.as_raw_fd(), READ_READY)];
        let start = Instant::now();
        assert_eq!(poll_until(&mut pfds, Some(Duration::ZERO)).unwrap(), 0);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn ready_descriptor_is_reported() {
        let (a, mut b) = UnixStream::pair().unwrap();
        b.write_all(b"x").unwrap();
        let mut pfds = [interest(a.as_raw_fd(), READ_READY)];
        assert_eq!(
            poll_until(&mut pfds, Some(Duration::from_millis(100))).unwrap(),
            1
        );
        assert_ne!(pfds[0].revents & POLLIN, 0);
    }

    #[test]
    fn fresh_socket_is_writable() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut pfds = [interest(a.as_raw_fd(), WRITE_READY)];
        assert_eq!(poll_until(&mut pfds, Some(Duration::ZERO)).unwrap(), 1);
    }

    #[test]
    fn waits_for_the_budget() {
        let mut pfds: [pollfd; 0] = [];
        let start = Instant::now();
        assert_eq!(
            poll_until(&mut pfds, Some(Duration::from_millis(30))).unwrap(),
            0
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
