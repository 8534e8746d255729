//! Shard Membership
//!
//! The data model shared by the shard manager, the load balancer and the
//! replicas: shard definitions (key ranges) and the replica membership of
//! every shard with its primary flag.
//!
//! ## Invariants
//! - **One primary**: [`PrimaryMap::set_primary`] clears every other flag of
//!   the shard before setting the winner, so a settled shard never has more
//!   than one primary.
//! - **Deterministic order**: all maps are ordered by id.

pub mod types;

pub use types::{PrimaryMap, ServerShards, ShardSpec};
