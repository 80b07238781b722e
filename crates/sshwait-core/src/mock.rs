use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::callback::{CallbackRegistry, CallbackTable, CallbackType, NotifyHandler};
use crate::direction::{BlockDirections, BlockingSession};

/// A scripted session engine for tests and demos.
///
/// The blocking direction can be changed from any thread. Every query is
/// counted so callers can check that the direction was re-read per wait.
pub struct MockSession {
    directions: AtomicU8,
    queries: AtomicUsize,
    callbacks: CallbackTable,
}

impl MockSession {
    pub fn new(directions: BlockDirections) -> Self {
        Self {
            directions: AtomicU8::new(directions.bits() as u8),
            queries: AtomicUsize::new(0),
            callbacks: CallbackTable::new(),
        }
    }

    pub fn set_directions(&self, directions: BlockDirections) {
        self.directions
            .store(directions.bits() as u8, Ordering::SeqCst);
    }

    /// How many times `block_directions` has been called.
    pub fn direction_queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut CallbackTable {
        &mut self.callbacks
    }

    /// Deliver an engine notification, as the protocol engine would on
    /// receiving a disconnect or debug message.
    pub fn emit(&self, kind: CallbackType, reason: i32, message: &[u8], language: &[u8]) -> bool {
        self.callbacks.notify(kind, reason, message, language)
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new(BlockDirections::NONE)
    }
}

impl BlockingSession for MockSession {
    fn block_directions(&self) -> BlockDirections {
        self.queries.fetch_add(1, Ordering::SeqCst);
        BlockDirections::from_bits(self.directions.load(Ordering::SeqCst) as i32)
    }
}

impl CallbackRegistry for MockSession {
    fn callback_set(
        &mut self,
        kind: CallbackType,
        handler: Option<NotifyHandler>,
    ) -> Option<NotifyHandler> {
        self.callbacks.callback_set(kind, handler)
    }
}
