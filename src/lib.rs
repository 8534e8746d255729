//! Sharded Student Record Store
//!
//! A key-range sharded table replicated across processes, with one primary
//! per shard and automatic failover. One binary runs any of three roles.
//!
//! ## Roles
//! - **`balancer`**: client entry point. Routes reads through a
//!   consistent-hash ring of each shard's replicas and mutations to the
//!   shard's primary, numbering them per shard.
//! - **`manager`**: owns membership. Provisions replicas, elects primaries by
//!   log length and replaces replicas that stop answering heartbeats.
//! - **`replica`**: hosts shards. Every mutation goes through a per-shard
//!   write-ahead log, is fanned out by the primary and replayed into the
//!   storage engine.
//!
//! ## Supporting Modules
//! - **`ring`**, **`membership`**: placement and primary bookkeeping.
//! - **`wal`**, **`store`**: the per-shard log and the table storage behind it.
//! - **`net`**: name resolution, HTTP transport and retry with backoff.
//! - **`config`**, **`error`**: command line and the shared error type.

pub mod balancer;
pub mod config;
pub mod error;
pub mod manager;
pub mod membership;
pub mod net;
pub mod replica;
pub mod ring;
pub mod store;
pub mod wal;

#[cfg(test)]
mod testkit;
