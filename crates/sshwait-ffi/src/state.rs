//! Per-thread error slot for the C ABI.
//!
//! Waits run on the caller's thread and C callers read the error right after
//! a `-1` return, so a thread-local is enough and no call sees another
//! thread's failure.

use std::cell::Cell;

use sshwait_core::BridgeError;

thread_local! {
    static LAST_ERROR: Cell<i32> = const { Cell::new(0) };
}

/// Record `err` as this thread's last error and return the ABI failure code.
pub fn fail(err: &BridgeError) -> i32 {
    LAST_ERROR.with(|e| e.set(errno_for(err)));
    -1
}

/// Clear this thread's last error and pass `value` through.
pub fn succeed(value: i32) -> i32 {
    LAST_ERROR.with(|e| e.set(0));
    value
}

pub fn last_error() -> i32 {
    LAST_ERROR.with(|e| e.get())
}

pub fn set_last_error(code: i32) {
    LAST_ERROR.with(|e| e.set(code));
}

fn errno_for(err: &BridgeError) -> i32 {
    match err {
        BridgeError::Wait(e) => e.raw_os_error().unwrap_or(libc::EIO),
        BridgeError::InvalidDescriptor(_) => libc::EBADF,
        BridgeError::Timeout => libc::ETIMEDOUT,
        BridgeError::Cancelled => libc::ECANCELED,
        _ => libc::EIO,
    }
}
