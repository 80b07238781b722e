//! Typed session notifications.
//!
//! Session engines deliver disconnect and debug notifications through a
//! single callback-registration entry keyed by an integer type code. This
//! module gives that entry a typed signature: handlers implement
//! [`SessionNotify`], engines implement [`CallbackRegistry`], and
//! [`register_callback`] forwards one to the other unchanged.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

/// Notification class a handler is registered for. Codes match libssh2's
/// `LIBSSH2_CALLBACK_*` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CallbackType {
    Debug = 1,
    Disconnect = 2,
}

impl CallbackType {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(CallbackType::Debug),
            2 => Some(CallbackType::Disconnect),
            _ => None,
        }
    }
}

/// Opaque per-session value handed to every notification.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// A single notification as delivered by the engine.
#[derive(Debug, Clone, Copy)]
pub struct Notification<'a> {
    /// Disconnect reason code, or the always-display flag for debug messages.
    pub reason: i32,
    pub message: &'a [u8],
    /// RFC 3066 language tag; usually empty.
    pub language: &'a [u8],
    pub user_data: Option<&'a (dyn Any + Send + Sync)>,
}

impl<'a> Notification<'a> {
    pub fn new(reason: i32, message: &'a [u8], language: &'a [u8]) -> Self {
        Self {
            reason,
            message,
            language,
            user_data: None,
        }
    }

    pub fn message_lossy(&self) -> String {
        String::from_utf8_lossy(self.message).into_owned()
    }

    pub fn language_lossy(&self) -> String {
        String::from_utf8_lossy(self.language).into_owned()
    }

    /// Downcast the user-data slot.
    pub fn user_data<T: Any>(&self) -> Option<&'a T> {
        self.user_data.and_then(|d| d.downcast_ref::<T>())
    }
}

/// Receiver of engine notifications.
pub trait SessionNotify: Send + Sync {
    fn on_event(&self, event: &Notification<'_>);
}

impl<F> SessionNotify for F
where
    F: Fn(&Notification<'_>) + Send + Sync,
{
    fn on_event(&self, event: &Notification<'_>) {
        self(event)
    }
}

pub type NotifyHandler = Arc<dyn SessionNotify>;

/// An engine's callback-registration entry point.
pub trait CallbackRegistry {
    /// Install `handler` for `kind` (or remove it with `None`), returning the
    /// handler previously installed.
    fn callback_set(
        &mut self,
        kind: CallbackType,
        handler: Option<NotifyHandler>,
    ) -> Option<NotifyHandler>;
}

/// Register `handler` on `session` and return the previous handler.
pub fn register_callback<E>(
    session: &mut E,
    kind: CallbackType,
    handler: NotifyHandler,
) -> Option<NotifyHandler>
where
    E: CallbackRegistry + ?Sized,
{
    trace!(kind = ?kind, "registering session callback");
    session.callback_set(kind, Some(handler))
}

/// Remove the handler for `kind`, returning it.
pub fn clear_callback<E>(session: &mut E, kind: CallbackType) -> Option<NotifyHandler>
where
    E: CallbackRegistry + ?Sized,
{
    trace!(kind = ?kind, "clearing session callback");
    session.callback_set(kind, None)
}

/// Handler storage for engines written in Rust.
#[derive(Default)]
pub struct CallbackTable {
    handlers: HashMap<CallbackType, NotifyHandler>,
    user_data: Option<UserData>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: CallbackType) -> Option<&NotifyHandler> {
        self.handlers.get(&kind)
    }

    pub fn set_user_data(&mut self, data: Option<UserData>) -> Option<UserData> {
        std::mem::replace(&mut self.user_data, data)
    }

    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }

    /// Deliver a notification. Returns false if no handler is registered.
    pub fn notify(&self, kind: CallbackType, reason: i32, message: &[u8], language: &[u8]) -> bool {
        let Some(handler) = self.handlers.get(&kind) else {
            return false;
        };
        let event = Notification {
            reason,
            message,
            language,
            user_data: self.user_data.as_deref(),
        };
        handler.on_event(&event);
        true
    }
}

impl CallbackRegistry for CallbackTable {
    fn callback_set(
        &mut self,
        kind: CallbackType,
        handler: Option<NotifyHandler>,
    ) -> Option<NotifyHandler> {
        match handler {
            Some(h) => self.handlers.insert(kind, h),
            None => self.handlers.remove(&kind),
        }
    }
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTable")
            .field("registered", &self.handlers.keys().collect::<Vec<_>>())
            .field("has_user_data", &self.user_data.is_some())
            .finish()
    }
}
