//! sshwait-core: Readiness bridge for non-blocking SSH session engines.
//!
//! Converts an engine's "would block in direction D" into a bounded blocking
//! wait on the session socket, and gives the engine's loosely typed callback
//! registration a typed front door.

pub mod callback;
pub mod config;
pub mod direction;
#[cfg(unix)]
pub mod driver;
pub mod error;
pub mod mock;
pub mod raw;
#[cfg(unix)]
pub mod wait;

// Re-export commonly used items at crate root.
pub use callback::{
    clear_callback, register_callback, CallbackRegistry, CallbackTable, CallbackType,
    Notification, NotifyHandler, SessionNotify,
};
pub use config::{Config, ConfigError};
pub use direction::{BlockDirections, BlockingSession, Direction};
#[cfg(unix)]
pub use driver::{Driver, Step};
pub use error::{BridgeError, BridgeResult};
pub use raw::{register_raw_callback, RawCallbackRegistry, RawNotifyFn};
#[cfg(unix)]
pub use wait::{
    wait_for_socket, wait_for_socket_timeout, Readiness, ReadinessBridge, ReadinessRequest,
    WaitOutcome, DEFAULT_POLL_INTERVAL,
};
