//! Shard Manager
//!
//! The manager is the only component that decides which replica is primary
//! for a shard. It provisions replica processes, hands them their shard lists
//! and pushes every membership change to all replicas.
//!
//! ## Election
//! Every reachable member reports the length of its log for the shard; the
//! longest log wins. Ties are broken by the lowest server id.
//!
//! ## Failure Handling
//! A heartbeat loop probes each replica. When one stops answering:
//! 1. Shards it led get a new primary elected among the remaining members.
//! 2. It is restarted under the same name with an empty data directory.
//! 3. The fresh replica copies each shard from the current primary and
//!    rejoins as a secondary.

pub mod client;
pub mod handlers;
pub mod protocol;
pub mod provisioner;
pub mod service;

pub use client::{HttpManagerClient, MANAGER_NAME, ManagerClient};
pub use provisioner::{ProcessProvisioner, Provisioner};
pub use service::ShardManager;

use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use std::sync::Arc;

use handlers::*;
use protocol::*;

pub fn router(manager: Arc<ShardManager>) -> Router {
    Router::new()
        .route(ENDPOINT_INIT, post(handle_init))
        .route(ENDPOINT_ADD, post(handle_add))
        .route(ENDPOINT_RM, post(handle_remove))
        .route(ENDPOINT_PSINFO, get(handle_psinfo))
        .layer(Extension(manager))
}
