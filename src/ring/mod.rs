//! Consistent Hash Ring
//!
//! Spreads reads for one shard across its replicas. Each server occupies
//! [`VIRTUAL_SLOTS`] of the ring's [`RING_SLOTS`] positions, placed by a
//! secondary mixing hash of `(server hash, virtual index)` with linear probing
//! on collision. Membership changes only touch the changed server's slots.

pub mod ring;

pub use ring::{HashRing, RING_SLOTS, VIRTUAL_SLOTS};
