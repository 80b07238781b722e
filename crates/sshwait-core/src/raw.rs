//! C-ABI callback trampoline.
//!
//! libssh2 registers notification handlers through
//! `libssh2_session_callback_set(session, cbtype, void *callback)`, which
//! erases the handler's signature. [`register_raw_callback`] accepts a
//! handler of the exact disconnect/debug signature and forwards it through
//! the untyped entry, converting the previous value back on return.

use std::ffi::{c_char, c_int, c_void};

use tracing::trace;

use crate::callback::CallbackType;

/// Engine notification handler with the disconnect signature:
/// `(session, reason, message, message_len, language, language_len, abstract)`.
pub type RawNotifyFn = unsafe extern "C" fn(
    session: *mut c_void,
    reason: c_int,
    message: *const c_char,
    message_len: c_int,
    language: *const c_char,
    language_len: c_int,
    user_data: *mut *mut c_void,
);

/// An engine whose callback-registration entry takes an untyped pointer.
pub trait RawCallbackRegistry {
    /// Store `callback` for `cbtype` and return the previously stored pointer
    /// (null if none).
    ///
    /// # Safety
    ///
    /// The engine will later call `callback` with its own arguments; the
    /// pointer must be valid for the registered callback type.
    unsafe fn callback_set_raw(&mut self, cbtype: c_int, callback: *mut c_void) -> *mut c_void;
}

/// Register a typed handler through an untyped registration entry.
///
/// Returns the previously registered handler, or `None` if there was none.
///
/// # Safety
///
/// Every non-null pointer stored in `session` for `kind` must have been
/// registered as a [`RawNotifyFn`]; the previous value is reinterpreted as
/// one.
pub unsafe fn register_raw_callback<E>(
    session: &mut E,
    kind: CallbackType,
    handler: Option<RawNotifyFn>,
) -> Option<RawNotifyFn>
where
    E: RawCallbackRegistry + ?Sized,
{
    let ptr = match handler {
        Some(f) => f as *mut c_void,
        None => std::ptr::null_mut(),
    };
    trace!(kind = ?kind, null = ptr.is_null(), "forwarding raw callback registration");
    let previous = unsafe { session.callback_set_raw(kind.code(), ptr) };
    if previous.is_null() {
        None
    } else {
        Some(unsafe { std::mem::transmute::<*mut c_void, RawNotifyFn>(previous) })
    }
}
