mod foreign;
mod state;

use std::ffi::{c_char, c_int, c_void};
use std::time::Duration;

use sshwait_core::{
    register_raw_callback, wait_for_socket, BlockDirections, CallbackType, RawNotifyFn,
    ReadinessRequest,
};
use tracing::debug;

pub use foreign::{BlockDirectionsFn, CallbackSetFn, ForeignSession};

// ── READINESS ────────────────────────────────────────────────────────

/// Wait until `socket_fd` is ready in `directions` (1=inbound, 2=outbound,
/// 3=both) or `timeout_ms` elapses.
/// Returns the ready count, 0 on timeout, -1 on error (see `sshwait_last_error`).
/// A successful call clears the error slot.
#[unsafe(no_mangle)]
pub extern "C" fn sshwait_wait_socket(socket_fd: c_int, directions: c_int, timeout_ms: u32) -> c_int {
    let request = ReadinessRequest::new(
        socket_fd,
        BlockDirections::from_bits(directions),
        Duration::from_millis(timeout_ms as u64),
    );
    match request.wait() {
        Ok(outcome) => state::succeed(outcome.ready_count()),
        Err(e) => state::fail(&e),
    }
}

/// Wait up to one second for `socket_fd` in whatever direction `session`
/// is blocked on, as reported by `block_directions(session)`.
/// Returns the ready count, 0 on timeout, -1 on error.
///
/// # Safety
///
/// `session` must be a live engine handle accepted by `block_directions`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sshwait_waitsocket(
    socket_fd: c_int,
    session: *mut c_void,
    block_directions: Option<BlockDirectionsFn>,
) -> c_int {
    if session.is_null() || block_directions.is_none() {
        state::set_last_error(libc::EINVAL);
        return -1;
    }
    let session = unsafe { ForeignSession::new(session, block_directions, None) };
    match wait_for_socket(socket_fd, &session) {
        Ok(outcome) => state::succeed(outcome.ready_count()),
        Err(e) => state::fail(&e),
    }
}

// ── CALLBACKS ────────────────────────────────────────────────────────

/// Register `handler` for `cbtype` through the engine's untyped
/// `callback_set` entry and return the previously registered handler
/// (null if none). Unknown callback types are not forwarded.
///
/// A null return is ambiguous: `sshwait_last_error` is 0 when the call was
/// forwarded and there was no previous handler, and `EINVAL` when the call
/// was refused.
///
/// # Safety
///
/// `session` must be a live engine handle accepted by `callback_set`, and
/// every handler previously stored for `cbtype` must have the
/// [`RawNotifyFn`] signature.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sshwait_callback_set(
    session: *mut c_void,
    cbtype: c_int,
    handler: Option<RawNotifyFn>,
    callback_set: Option<CallbackSetFn>,
) -> Option<RawNotifyFn> {
    let Some(kind) = CallbackType::from_code(cbtype) else {
        debug!(cbtype, "refusing unknown callback type");
        state::set_last_error(libc::EINVAL);
        return None;
    };
    if session.is_null() || callback_set.is_none() {
        state::set_last_error(libc::EINVAL);
        return None;
    }
    let mut session = unsafe { ForeignSession::new(session, None, callback_set) };
    state::set_last_error(0);
    unsafe { register_raw_callback(&mut session, kind, handler) }
}

// ── DIAGNOSTICS ──────────────────────────────────────────────────────

/// OS error code of this thread's most recent failed call, 0 if none.
#[unsafe(no_mangle)]
pub extern "C" fn sshwait_last_error() -> c_int {
    state::last_error()
}

/// NUL-terminated library version string.
#[unsafe(no_mangle)]
pub extern "C" fn sshwait_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}
