//! # Loopback engine
//!
//! Drives a toy non-blocking line engine over a Unix socket pair, the way an
//! embedding drives libssh2: call the engine, and when it reports "would
//! block", park on the readiness bridge until the socket can move.
//!
//! Demonstrates:
//! - Driver loop with per-wait polling interval from config
//! - Direction tracking (inbound while reading, outbound while writing)
//! - Disconnect notification through the typed callback registry
//!
//! Usage: `loopback [config.toml]`, `RUST_LOG=trace` to see every wait.

use std::cell::{Cell, RefCell};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use sshwait_core::{
    register_callback, BlockDirections, BlockingSession, BridgeError, BridgeResult,
    CallbackRegistry, CallbackTable, CallbackType, Config, Driver, Notification, NotifyHandler,
    Step,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// libssh2's LIBSSH2_ERROR_SOCKET_RECV / SOCKET_DISCONNECT
const ERROR_SOCKET_RECV: i32 = -43;
const ERROR_SOCKET_DISCONNECT: i32 = -13;
const SSH_DISCONNECT_BY_APPLICATION: i32 = 11;

/// A newline-framed "protocol engine" with libssh2-style would-block results.
struct LineEngine {
    stream: RefCell<UnixStream>,
    pending: RefCell<Vec<u8>>,
    directions: Cell<BlockDirections>,
    callbacks: CallbackTable,
}

impl LineEngine {
    fn new(stream: UnixStream) -> Self {
        Self {
            stream: RefCell::new(stream),
            pending: RefCell::new(Vec::new()),
            directions: Cell::new(BlockDirections::NONE),
            callbacks: CallbackTable::new(),
        }
    }

    fn fd(&self) -> RawFd {
        self.stream.borrow().as_raw_fd()
    }

    fn read_line(&self) -> BridgeResult<Step<String>> {
        let mut pending = self.pending.borrow_mut();
        loop {
            if let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                self.directions.set(BlockDirections::NONE);
                let line = String::from_utf8_lossy(&line).trim_end().to_string();
                return Ok(Step::Complete(line));
            }

            let mut buf = [0u8; 256];
            match self.stream.borrow_mut().read(&mut buf) {
                Ok(0) => {
                    self.directions.set(BlockDirections::NONE);
                    self.callbacks.notify(
                        CallbackType::Disconnect,
                        SSH_DISCONNECT_BY_APPLICATION,
                        b"peer closed the connection",
                        b"",
                    );
                    return Err(BridgeError::engine(ERROR_SOCKET_DISCONNECT, "connection closed"));
                }
                Ok(n) => pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.directions.set(BlockDirections::INBOUND);
                    return Ok(Step::WouldBlock);
                }
                Err(e) => return Err(BridgeError::engine(ERROR_SOCKET_RECV, e.to_string())),
            }
        }
    }

    fn send(&self, data: &[u8]) -> BridgeResult<Step<usize>> {
        match self.stream.borrow_mut().write(data) {
            Ok(n) => {
                self.directions.set(BlockDirections::NONE);
                Ok(Step::Complete(n))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                self.directions.set(BlockDirections::OUTBOUND);
                Ok(Step::WouldBlock)
            }
            Err(e) => Err(BridgeError::engine(ERROR_SOCKET_RECV, e.to_string())),
        }
    }
}

impl BlockingSession for LineEngine {
    fn block_directions(&self) -> BlockDirections {
        self.directions.get()
    }
}

impl CallbackRegistry for LineEngine {
    fn callback_set(
        &mut self,
        kind: CallbackType,
        handler: Option<NotifyHandler>,
    ) -> Option<NotifyHandler> {
        self.callbacks.callback_set(kind, handler)
    }
}

/// The remote side: sends its banner late, answers once, then hangs up.
fn run_peer(stream: UnixStream) -> std::io::Result<()> {
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    thread::sleep(Duration::from_millis(1500));
    writer.write_all(b"SSH-2.0-loopback_peer\r\n")?;

    let mut banner = String::new();
    reader.read_line(&mut banner)?;
    writer.write_all(format!("hello {}\n", banner.trim_end()).as_bytes())?;

    thread::sleep(Duration::from_millis(500));
    Ok(())
}

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading {path}"))?,
        None => Config::default(),
    };
    let driver = Driver::from_config(&config);
    let driver = match driver.operation_timeout() {
        Some(_) => driver,
        None => driver.with_operation_timeout(Duration::from_secs(10)),
    };
    info!(
        poll_interval = ?driver.bridge().poll_interval(),
        operation_timeout = ?driver.operation_timeout(),
        "starting loopback session"
    );

    let (local, remote) = UnixStream::pair().context("creating socket pair")?;
    local.set_nonblocking(true)?;
    let peer = thread::spawn(move || run_peer(remote));

    let mut engine = LineEngine::new(local);
    let handler: NotifyHandler = Arc::new(|n: &Notification<'_>| {
        info!(reason = n.reason, message = %n.message_lossy(), "disconnect notification");
    });
    register_callback(&mut engine, CallbackType::Disconnect, handler);

    let fd = engine.fd();

    let banner = driver.run(fd, &engine, || engine.read_line())?;
    info!(%banner, "peer banner");

    driver.write_all(fd, &engine, b"SSH-2.0-sshwait_demo\r\n", |chunk| engine.send(chunk))?;

    let reply = driver.run(fd, &engine, || engine.read_line())?;
    info!(%reply, "peer reply");

    match driver.run(fd, &engine, || engine.read_line()) {
        Err(BridgeError::Engine { code, message }) => info!(code, %message, "session ended"),
        Ok(line) => warn!(%line, "unexpected extra line"),
        Err(e) => return Err(e.into()),
    }

    peer.join()
        .map_err(|_| anyhow!("peer thread panicked"))?
        .context("peer failed")?;
    Ok(())
}
