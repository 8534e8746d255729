//! Load Balancer
//!
//! The client-facing entry point. It knows every shard's key range, keeps a
//! consistent-hash ring of each shard's replicas for reads, and numbers the
//! mutations it sends to each shard's primary.
//!
//! ## Routing
//! - **Reads** go to one replica per intersecting shard, picked by the ring,
//!   under the shard's read lock. A failing shard is reported, not fatal.
//! - **Writes, updates and deletes** go to the shard's current primary, as
//!   reported by the shard manager, under the shard's write lock. The write
//!   lock covers the sequence counter and is held across the retry loop, so a
//!   retried request keeps its sequence number.
//!
//! ## Locking Tradeoff
//! Shard locks are held across the outbound call. All access to a shard is
//! serialized for as long as a slow primary lookup or forward takes, and a
//! membership change waits for in-flight requests to finish. In exchange a
//! client never observes a shard mid-reconfiguration.

pub mod handlers;
pub mod protocol;
pub mod service;
pub mod types;

pub use service::LoadBalancer;
pub use types::{ShardMetadata, ShardState};

use axum::{
    Router,
    extract::Extension,
    routing::{delete, get, post, put},
};
use std::sync::Arc;

use handlers::*;
use protocol::*;

pub fn router(lb: Arc<LoadBalancer>) -> Router {
    Router::new()
        .route(ENDPOINT_INIT, post(handle_init))
        .route(ENDPOINT_STATUS, get(handle_status))
        .route(ENDPOINT_ADD, post(handle_add))
        .route(ENDPOINT_RM, delete(handle_remove))
        .route(ENDPOINT_READ, post(handle_read))
        .route(ENDPOINT_WRITE, post(handle_write))
        .route(ENDPOINT_UPDATE, put(handle_update))
        .route(ENDPOINT_DELETE, delete(handle_delete))
        .route(ENDPOINT_READ_SERVER, get(handle_read_server))
        .layer(Extension(lb))
}

#[cfg(test)]
mod tests;
