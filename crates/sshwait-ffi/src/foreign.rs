//! Engine handles owned by the C caller.

use std::ffi::{c_int, c_void};

use sshwait_core::{BlockDirections, BlockingSession, RawCallbackRegistry};

/// `int (*)(LIBSSH2_SESSION *)`, e.g. `libssh2_session_block_directions`.
pub type BlockDirectionsFn = unsafe extern "C" fn(session: *mut c_void) -> c_int;

/// `void *(*)(LIBSSH2_SESSION *, int, void *)`, e.g. `libssh2_session_callback_set`.
pub type CallbackSetFn =
    unsafe extern "C" fn(session: *mut c_void, cbtype: c_int, callback: *mut c_void) -> *mut c_void;

/// A borrowed engine handle plus the C entry points that operate on it.
/// Never frees or otherwise owns `handle`.
pub struct ForeignSession {
    handle: *mut c_void,
    block_directions: Option<BlockDirectionsFn>,
    callback_set: Option<CallbackSetFn>,
}

impl ForeignSession {
    /// # Safety
    ///
    /// `handle` must stay valid for the lifetime of this value and be
    /// accepted by the supplied entry points.
    pub unsafe fn new(
        handle: *mut c_void,
        block_directions: Option<BlockDirectionsFn>,
        callback_set: Option<CallbackSetFn>,
    ) -> Self {
        Self {
            handle,
            block_directions,
            callback_set,
        }
    }
}

impl BlockingSession for ForeignSession {
    fn block_directions(&self) -> BlockDirections {
        match self.block_directions {
            Some(f) => BlockDirections::from_bits(unsafe { f(self.handle) }),
            None => BlockDirections::NONE,
        }
    }
}

impl RawCallbackRegistry for ForeignSession {
    unsafe fn callback_set_raw(&mut self, cbtype: c_int, callback: *mut c_void) -> *mut c_void {
        match self.callback_set {
            Some(f) => unsafe { f(self.handle, cbtype, callback) },
            None => std::ptr::null_mut(),
        }
    }
}
