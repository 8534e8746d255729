//! Write-Ahead Log
//!
//! One append-only log per shard per replica. Every mutation a replica accepts
//! is appended here before it touches the storage engine and before it is
//! forwarded to secondaries.
//!
//! ## Core Concepts
//! - **Commit index**: number of entries ever appended. Never decreases; it is
//!   the freshness measure used by leader election.
//! - **Replay cursor**: number of entries already applied to storage. Always
//!   `<= commit index`, persisted after every applied entry.
//! - **Sequence numbers**: each entry remembers the sequence number it was
//!   appended with, so a retried forward is recognised and acknowledged
//!   without being appended twice.
//!
//! On disk a shard uses two files in the replica's data directory:
//! `<shard>.log` (one JSON entry per line) and `<shard>.idx` (the cursor).

pub mod log;
pub mod types;

pub use log::{ReplayReport, WriteAheadLog};
pub use types::{LogEntry, Operation, Sequence};
