//! Block-direction model.
//!
//! A non-blocking session engine reports which way the socket has to move
//! before it can make progress: inbound (readable), outbound (writable), or
//! both. The bit values match libssh2's `LIBSSH2_SESSION_BLOCK_*` constants so
//! a raw engine result can be passed straight to [`BlockDirections::from_bits`].

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

/// Bitmask of directions the engine is currently blocked on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockDirections(u8);

impl BlockDirections {
    pub const NONE: Self = Self(0);
    pub const INBOUND: Self = Self(0x1);
    pub const OUTBOUND: Self = Self(0x2);
    pub const BOTH: Self = Self(0x3);

    /// Build from a raw engine bitmask. Unknown bits are dropped.
    pub fn from_bits(bits: i32) -> Self {
        Self((bits & Self::BOTH.0 as i32) as u8)
    }

    pub fn bits(self) -> i32 {
        self.0 as i32
    }

    /// The engine needs the socket to become readable.
    pub fn is_inbound(self) -> bool {
        self.0 & Self::INBOUND.0 != 0
    }

    /// The engine needs the socket to become writable.
    pub fn is_outbound(self) -> bool {
        self.0 & Self::OUTBOUND.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn direction(self) -> Option<Direction> {
        match (self.is_inbound(), self.is_outbound()) {
            (true, true) => Some(Direction::Both),
            (true, false) => Some(Direction::Read),
            (false, true) => Some(Direction::Write),
            (false, false) => None,
        }
    }
}

impl BitOr for BlockDirections {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for BlockDirections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction() {
            Some(d) => write!(f, "{d:?}"),
            None => f.write_str("None"),
        }
    }
}

/// The I/O direction a readiness wait watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
    Both,
}

impl From<Direction> for BlockDirections {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Read => BlockDirections::INBOUND,
            Direction::Write => BlockDirections::OUTBOUND,
            Direction::Both => BlockDirections::BOTH,
        }
    }
}

/// A session engine that can report its current blocking direction.
///
/// The session itself stays owned by the caller; the bridge only borrows it
/// long enough to read the bitmask.
pub trait BlockingSession {
    /// Directions the engine is blocked on right now. Must reflect the state
    /// after the most recent engine operation; callers never cache it.
    fn block_directions(&self) -> BlockDirections;
}

impl<T: BlockingSession + ?Sized> BlockingSession for &T {
    fn block_directions(&self) -> BlockDirections {
        (**self).block_directions()
    }
}

impl<T: BlockingSession + ?Sized> BlockingSession for Arc<T> {
    fn block_directions(&self) -> BlockDirections {
        (**self).block_directions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bits_matches_engine_constants() {
        assert_eq!(BlockDirections::from_bits(0), BlockDirections::NONE);
        assert_eq!(BlockDirections::from_bits(1), BlockDirections::INBOUND);
        assert_eq!(BlockDirections::from_bits(2), BlockDirections::OUTBOUND);
        assert_eq!(BlockDirections::from_bits(3), BlockDirections::BOTH);
    }

    #[test]
    fn unknown_bits_are_dropped() {
        assert_eq!(BlockDirections::from_bits(0x10), BlockDirections::NONE);
        assert_eq!(BlockDirections::from_bits(0x11), BlockDirections::INBOUND);
        assert_eq!(BlockDirections::from_bits(-1), BlockDirections::BOTH);
    }

    #[test]
    fn direction_mapping() {
        assert_eq!(BlockDirections::NONE.direction(), None);
        assert_eq!(BlockDirections::INBOUND.direction(), Some(Direction::Read));
        assert_eq!(BlockDirections::OUTBOUND.direction(), Some(Direction::Write));
        assert_eq!(BlockDirections::BOTH.direction(), Some(Direction::Both));
        for d in [Direction::Read, Direction::Write, Direction::Both] {
            assert_eq!(BlockDirections::from(d).direction(), Some(d));
        }
    }

    #[test]
    fn bitor_combines() {
        let both = BlockDirections::INBOUND | BlockDirections::OUTBOUND;
        assert_eq!(both, BlockDirections::BOTH);
        assert!(both.is_inbound() && both.is_outbound());
        assert!(BlockDirections::NONE.is_empty());
    }

    #[test]
    fn debug_names_direction() {
        assert_eq!(format!("{:?}", BlockDirections::BOTH), "Both");
        assert_eq!(format!("{:?}", BlockDirections::NONE), "None");
    }

    #[test]
    fn session_impls_forward() {
        struct Fixed(BlockDirections);
        impl BlockingSession for Fixed {
            fn block_directions(&self) -> BlockDirections {
                self.0
            }
        }

        let s = Fixed(BlockDirections::OUTBOUND);
        let by_ref = &s;
        assert_eq!(by_ref.block_directions(), BlockDirections::OUTBOUND);
        let shared: Arc<dyn BlockingSession> = Arc::new(Fixed(BlockDirections::INBOUND));
        assert_eq!(shared.block_directions(), BlockDirections::INBOUND);
    }
}
