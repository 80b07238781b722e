//! Readiness bridge.
//!
//! Blocks the calling thread until a socket is actionable in whatever
//! direction the session engine currently needs, or until a bounded timeout
//! elapses. The timeout is a polling granularity for the caller's loop, not a
//! protocol deadline: on return the caller re-checks its own cancellation and
//! deadlines, then retries the engine operation.

use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

use tracing::trace;

use crate::config::Config;
use crate::direction::{BlockDirections, BlockingSession};
use crate::error::{BridgeError, BridgeResult};

/// Wait granularity used when the caller does not pick one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Which directions a completed wait found ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Ready count as reported by `select(2)`. A descriptor ready in both
    /// directions counts twice.
    pub count: i32,
    pub readable: bool,
    pub writable: bool,
}

/// Result of a single readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The descriptor became ready in at least one requested direction.
    Ready(Readiness),
    /// A direction was requested but nothing became ready in time.
    TimedOut,
    /// The engine reported no blocking direction. The call still slept the
    /// full timeout so a confused caller cannot spin.
    Idle,
}

impl WaitOutcome {
    /// Ready count in `select(2)` terms: 0 for a timeout or idle wait.
    pub fn ready_count(&self) -> i32 {
        match self {
            WaitOutcome::Ready(r) => r.count,
            WaitOutcome::TimedOut | WaitOutcome::Idle => 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready(_))
    }
}

/// One wait on one descriptor. Built fresh for every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessRequest {
    pub fd: RawFd,
    pub directions: BlockDirections,
    pub timeout: Duration,
}

impl ReadinessRequest {
    pub fn new(fd: RawFd, directions: BlockDirections, timeout: Duration) -> Self {
        Self {
            fd,
            directions,
            timeout,
        }
    }

    /// Snapshot the session's current blocking direction into a request.
    pub fn for_session<S>(fd: RawFd, session: &S, timeout: Duration) -> Self
    where
        S: BlockingSession + ?Sized,
    {
        Self::new(fd, session.block_directions(), timeout)
    }

    /// Perform the wait.
    pub fn wait(&self) -> BridgeResult<WaitOutcome> {
        check_descriptor(self.fd)?;

        let mut read_set = single_fd_set(self.fd);
        let mut write_set = single_fd_set(self.fd);
        let read_ptr: *mut libc::fd_set = if self.directions.is_inbound() {
            &mut read_set
        } else {
            ptr::null_mut()
        };
        let write_ptr: *mut libc::fd_set = if self.directions.is_outbound() {
            &mut write_set
        } else {
            ptr::null_mut()
        };
        let mut tv = to_timeval(self.timeout);

        // With no sets this is a plain sleep of `timeout`.
        let nfds = if self.directions.is_empty() { 0 } else { self.fd + 1 };
        let rc = unsafe { libc::select(nfds, read_ptr, write_ptr, ptr::null_mut(), &mut tv) };

        if rc < 0 {
            let err = io::Error::last_os_error();
            trace!(fd = self.fd, directions = ?self.directions, error = %err, "socket wait failed");
            return Err(BridgeError::Wait(err));
        }

        let outcome = if self.directions.is_empty() {
            WaitOutcome::Idle
        } else if rc == 0 {
            WaitOutcome::TimedOut
        } else {
            WaitOutcome::Ready(Readiness {
                count: rc,
                readable: !read_ptr.is_null() && unsafe { libc::FD_ISSET(self.fd, &read_set) },
                writable: !write_ptr.is_null() && unsafe { libc::FD_ISSET(self.fd, &write_set) },
            })
        };

        trace!(fd = self.fd, directions = ?self.directions, ?outcome, "socket wait returned");
        Ok(outcome)
    }
}

/// Blocking readiness waits with a fixed polling interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessBridge {
    poll_interval: Duration,
}

impl ReadinessBridge {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.wait.poll_interval())
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until `fd` is ready for the direction `session` is blocked on.
    pub fn wait<S>(&self, fd: RawFd, session: &S) -> BridgeResult<WaitOutcome>
    where
        S: BlockingSession + ?Sized,
    {
        ReadinessRequest::for_session(fd, session, self.poll_interval).wait()
    }
}

impl Default for ReadinessBridge {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

/// Wait up to one second for `fd` to become ready in the direction the
/// session currently needs.
pub fn wait_for_socket<S>(fd: RawFd, session: &S) -> BridgeResult<WaitOutcome>
where
    S: BlockingSession + ?Sized,
{
    wait_for_socket_timeout(fd, session, DEFAULT_POLL_INTERVAL)
}

/// [`wait_for_socket`] with an explicit polling interval.
pub fn wait_for_socket_timeout<S>(
    fd: RawFd,
    session: &S,
    timeout: Duration,
) -> BridgeResult<WaitOutcome>
where
    S: BlockingSession + ?Sized,
{
    ReadinessRequest::for_session(fd, session, timeout).wait()
}

// FD_SET on a descriptor outside [0, FD_SETSIZE) writes out of bounds.
fn check_descriptor(fd: RawFd) -> BridgeResult<()> {
    if fd < 0 || fd as i64 >= libc::FD_SETSIZE as i64 {
        return Err(BridgeError::InvalidDescriptor(fd));
    }
    Ok(())
}

fn single_fd_set(fd: RawFd) -> libc::fd_set {
    unsafe {
        let mut set: libc::fd_set = std::mem::zeroed();
        libc::FD_ZERO(&mut set);
        libc::FD_SET(fd, &mut set);
        set
    }
}

fn to_timeval(d: Duration) -> libc::timeval {
    libc::timeval {
        tv_sec: d.as_secs().min(i32::MAX as u64) as libc::time_t,
        tv_usec: d.subsec_micros() as libc::suseconds_t,
    }
}
