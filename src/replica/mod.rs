//! Replica Node
//!
//! A replica hosts a set of shards. Each shard has its own write-ahead log and
//! storage table.
//!
//! ## Write Path
//! 1. **Append**: the mutation is appended to the shard's log, unless its
//!    sequence number shows it was already appended (retried forward).
//! 2. **Fan-out**: if this replica is the shard's primary, the mutation is
//!    forwarded with the same sequence number to every secondary.
//! 3. **Replay**: pending log entries are applied to storage in order.
//!
//! ## Catch-up
//! A replica that starts hosting a shard which already has live members copies
//! a snapshot (rows, full log, commit index) from the primary, or from any
//! other member, before accepting mutations for it.

pub mod client;
pub mod handlers;
pub mod node;
pub mod protocol;

pub use client::{HttpReplicaClient, ReplicaClient};
pub use node::ReplicaNode;

use axum::{
    Router,
    extract::Extension,
    routing::{delete, get, post, put},
};
use std::sync::Arc;

use handlers::*;
use protocol::*;

pub fn router(node: Arc<ReplicaNode>) -> Router {
    Router::new()
        .route(ENDPOINT_HEARTBEAT, get(handle_heartbeat))
        .route(ENDPOINT_CONFIG, post(handle_config))
        .route(ENDPOINT_ADD_SHARD, post(handle_add_shard))
        .route(ENDPOINT_COPY, get(handle_copy))
        .route(ENDPOINT_LENLOG, post(handle_lenlog))
        .route(ENDPOINT_READ, post(handle_read))
        .route(ENDPOINT_WRITE, post(handle_write))
        .route(ENDPOINT_UPDATE, put(handle_update))
        .route(ENDPOINT_DELETE, delete(handle_delete))
        .route(ENDPOINT_UPDATE_PSINFO, post(handle_update_psinfo))
        .route(ENDPOINT_GETALL, get(handle_getall))
        .layer(Extension(node))
}
