//! Driver loop over non-blocking engine operations.
//!
//! Runs an engine operation (handshake step, channel read, channel write)
//! until it stops reporting "would block", parking on the readiness bridge in
//! between. The bridge itself never retries; the deadline and cancel checks
//! live here, between bounded waits.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::Config;
use crate::direction::BlockingSession;
use crate::error::{BridgeError, BridgeResult};
use crate::wait::ReadinessBridge;

/// Result of one non-blocking engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<T> {
    Complete(T),
    /// The engine returned its EAGAIN equivalent.
    WouldBlock,
}

/// Re-invokes engine operations across readiness waits.
#[derive(Debug, Clone, Default)]
pub struct Driver {
    bridge: ReadinessBridge,
    operation_timeout: Option<Duration>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Driver {
    pub fn new(bridge: ReadinessBridge) -> Self {
        Self {
            bridge,
            operation_timeout: None,
            cancel: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut driver = Self::new(ReadinessBridge::from_config(config));
        driver.operation_timeout = config.driver.operation_timeout();
        driver
    }

    /// Give up with [`BridgeError::Timeout`] once an operation has been
    /// blocked for longer than `timeout`. A [`Driver::write_all`] counts as
    /// one operation.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Stop with [`BridgeError::Cancelled`] once `flag` is set. Checked
    /// between waits, so cancellation lands within one poll interval.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn bridge(&self) -> &ReadinessBridge {
        &self.bridge
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout
    }

    /// Call `op` until it completes.
    pub fn run<S, T, F>(&self, fd: RawFd, session: &S, op: F) -> BridgeResult<T>
    where
        S: BlockingSession + ?Sized,
        F: FnMut() -> BridgeResult<Step<T>>,
    {
        self.run_until(fd, session, self.deadline(), op)
    }

    /// Push all of `buf` through a partial-write operation.
    ///
    /// `write` receives the unwritten tail and reports how many bytes the
    /// engine accepted. The operation timeout covers the whole buffer, not
    /// each chunk.
    pub fn write_all<S, F>(&self, fd: RawFd, session: &S, buf: &[u8], mut write: F) -> BridgeResult<()>
    where
        S: BlockingSession + ?Sized,
        F: FnMut(&[u8]) -> BridgeResult<Step<usize>>,
    {
        let deadline = self.deadline();
        let mut written = 0;
        while written < buf.len() {
            let n = self.run_until(fd, session, deadline, || write(&buf[written..]))?;
            if n == 0 {
                return Err(BridgeError::WriteZero);
            }
            written += n;
        }
        Ok(())
    }

    // A timeout too large to represent is no deadline.
    fn deadline(&self) -> Option<Instant> {
        self.operation_timeout
            .and_then(|limit| Instant::now().checked_add(limit))
    }

    fn run_until<S, T, F>(
        &self,
        fd: RawFd,
        session: &S,
        deadline: Option<Instant>,
        mut op: F,
    ) -> BridgeResult<T>
    where
        S: BlockingSession + ?Sized,
        F: FnMut() -> BridgeResult<Step<T>>,
    {
        let mut attempts: u32 = 0;

        loop {
            if let Step::Complete(value) = op()? {
                return Ok(value);
            }
            attempts += 1;

            if self.is_cancelled() {
                debug!(fd, attempts, "operation cancelled");
                return Err(BridgeError::Cancelled);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    debug!(fd, attempts, limit = ?self.operation_timeout, "operation timed out");
                    return Err(BridgeError::Timeout);
                }
            }

            match self.bridge.wait(fd, session) {
                Ok(outcome) => trace!(fd, attempts, ?outcome, "retrying engine operation"),
                Err(e) if e.is_interrupted() => trace!(fd, "wait interrupted"),
                Err(e) => return Err(e),
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::BlockDirections;
    use crate::mock::MockSession;
    use std::io::{ErrorKind, Read, Write};
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::thread;

    const TICK: Duration = Duration::from_millis(50);

    fn driver() -> Driver {
        Driver::new(ReadinessBridge::new(TICK))
    }

    fn nonblocking_pair() -> (UnixStream, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        (a, b)
    }

    #[test]
    fn completes_without_waiting() {
        let (a, _b) = nonblocking_pair();
        let session = MockSession::new(BlockDirections::INBOUND);
        let value = driver().run(a.as_raw_fd(), &session, || Ok(Step::Complete(7))).unwrap();
        assert_eq!(value, 7);
        assert_eq!(session.direction_queries(), 0);
    }

    #[test]
    fn waits_for_data_then_completes() {
        let (mut a, mut b) = nonblocking_pair();
        let fd = a.as_raw_fd();
        let session = MockSession::new(BlockDirections::INBOUND);

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(120));
            b.write_all(b"SSH-2.0-peer\r\n").unwrap();
            b
        });

        let mut buf = [0u8; 64];
        let n = driver()
            .run(fd, &session, || match a.read(&mut buf) {
                Ok(n) => Ok(Step::Complete(n)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(Step::WouldBlock),
                Err(e) => Err(e.into()),
            })
            .unwrap();

        assert_eq!(&buf[..n], b"SSH-2.0-peer\r\n");
        assert!(session.direction_queries() >= 1);
        writer.join().unwrap();
    }

    #[test]
    fn deadline_exceeded_is_timeout() {
        let (a, _b) = nonblocking_pair();
        let session = MockSession::new(BlockDirections::INBOUND);
        let d = driver().with_operation_timeout(Duration::from_millis(150));

        let start = Instant::now();
        let err = d
            .run(a.as_raw_fd(), &session, || Ok::<_, BridgeError>(Step::<()>::WouldBlock))
            .unwrap_err();

        assert!(matches!(err, BridgeError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn cancel_flag_stops_loop() {
        let (a, _b) = nonblocking_pair();
        let session = MockSession::new(BlockDirections::INBOUND);
        let flag = Arc::new(AtomicBool::new(false));
        let d = driver().with_cancel_flag(flag.clone());

        let mut calls = 0;
        let err = d
            .run(a.as_raw_fd(), &session, || {
                calls += 1;
                if calls == 3 {
                    flag.store(true, Ordering::SeqCst);
                }
                Ok::<_, BridgeError>(Step::<()>::WouldBlock)
            })
            .unwrap_err();

        assert!(matches!(err, BridgeError::Cancelled));
        assert_eq!(calls, 3);
    }

    #[test]
    fn engine_errors_propagate() {
        let (a, _b) = nonblocking_pair();
        let session = MockSession::new(BlockDirections::INBOUND);
        let err = driver()
            .run(a.as_raw_fd(), &session, || {
                Err::<Step<()>, _>(BridgeError::engine(-43, "socket recv"))
            })
            .unwrap_err();
        assert!(matches!(err, BridgeError::Engine { code: -43, .. }));
    }

    #[test]
    fn wait_errors_propagate() {
        let session = MockSession::new(BlockDirections::INBOUND);
        let err = driver()
            .run(-1, &session, || Ok::<_, BridgeError>(Step::<()>::WouldBlock))
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidDescriptor(-1)));
    }

    #[test]
    fn write_all_handles_partial_writes() {
        let (a, _b) = nonblocking_pair();
        let session = MockSession::new(BlockDirections::OUTBOUND);
        let mut sink = Vec::new();
        let mut blocked_once = false;

        driver()
            .write_all(a.as_raw_fd(), &session, b"hello world", |chunk| {
                if !blocked_once {
                    blocked_once = true;
                    return Ok(Step::WouldBlock);
                }
                let n = chunk.len().min(4);
                sink.extend_from_slice(&chunk[..n]);
                Ok(Step::Complete(n))
            })
            .unwrap();

        assert_eq!(sink, b"hello world");
        assert_eq!(session.direction_queries(), 1);
    }

    #[test]
    fn write_all_rejects_zero_progress() {
        let (a, _b) = nonblocking_pair();
        let session = MockSession::new(BlockDirections::OUTBOUND);
        let err = driver()
            .write_all(a.as_raw_fd(), &session, b"x", |_| Ok(Step::Complete(0)))
            .unwrap_err();
        assert!(matches!(err, BridgeError::WriteZero));
    }

    #[test]
    fn write_all_deadline_spans_every_chunk() {
        let (a, _b) = nonblocking_pair();
        let session = MockSession::new(BlockDirections::INBOUND);
        let d = driver().with_operation_timeout(Duration::from_millis(150));
        let mut sink = Vec::new();
        let mut blocked = false;

        let start = Instant::now();
        let err = d
            .write_all(a.as_raw_fd(), &session, b"0123456789", |chunk| {
                // One would-block per byte: each chunk costs a full tick.
                if !blocked {
                    blocked = true;
                    return Ok(Step::WouldBlock);
                }
                blocked = false;
                sink.push(chunk[0]);
                Ok(Step::Complete(1))
            })
            .unwrap_err();

        assert!(matches!(err, BridgeError::Timeout));
        assert!(sink.len() < 10, "wrote {} bytes", sink.len());
        assert!(start.elapsed() < Duration::from_millis(400), "took {:?}", start.elapsed());
    }

    extern "C" fn ignore_signal(_: libc::c_int) {}

    #[test]
    fn interrupted_wait_is_retried() {
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = ignore_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::sigemptyset(&mut action.sa_mask);
            assert_eq!(libc::sigaction(libc::SIGUSR1, &action, std::ptr::null_mut()), 0);
        }

        let (a, _b) = nonblocking_pair();
        let session = MockSession::new(BlockDirections::INBOUND);
        // Long enough that only a signal can end the first wait early.
        let d = Driver::new(ReadinessBridge::new(Duration::from_secs(10)));

        let target = unsafe { libc::pthread_self() } as usize;
        let done = Arc::new(AtomicBool::new(false));
        let kicker = {
            let done = done.clone();
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(20));
                    unsafe {
                        libc::pthread_kill(target as libc::pthread_t, libc::SIGUSR1);
                    }
                }
            })
        };

        let start = Instant::now();
        let mut calls = 0;
        let result = d.run(a.as_raw_fd(), &session, || {
            calls += 1;
            if calls == 1 {
                Ok(Step::WouldBlock)
            } else {
                Ok(Step::Complete(calls))
            }
        });
        done.store(true, Ordering::SeqCst);
        kicker.join().unwrap();

        assert_eq!(result.unwrap(), 2);
        assert_eq!(session.direction_queries(), 1);
        assert!(start.elapsed() < Duration::from_secs(5), "took {:?}", start.elapsed());
    }

    #[test]
    fn from_config_applies_timeouts() {
        let config = Config::from_toml(
            r#"
[wait]
poll_interval_ms = 250

[driver]
operation_timeout_ms = 5000
"#,
        )
        .unwrap();
        let d = Driver::from_config(&config);
        assert_eq!(d.bridge().poll_interval(), Duration::from_millis(250));
        assert_eq!(d.operation_timeout(), Some(Duration::from_secs(5)));
    }
}
