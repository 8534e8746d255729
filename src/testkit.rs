//! In-process cluster used by the tests: replicas live in a map instead of
//! behind sockets, and "killing" one just makes it unreachable.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::balancer::LoadBalancer;
use crate::error::{ClusterError, Result};
use crate::manager::protocol::*;
use crate::manager::{ManagerClient, Provisioner, ShardManager};
use crate::membership::{PrimaryMap, ServerShards, ShardSpec};
use crate::net::RetryPolicy;
use crate::replica::protocol::*;
use crate::replica::{ReplicaClient, ReplicaNode};
use crate::store::{MemoryTableStore, StudentRecord};
use crate::wal::Sequence;

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::bounded(5, Duration::from_millis(1), Duration::from_millis(5))
}

pub struct LocalCluster {
    me: Weak<LocalCluster>,
    nodes: DashMap<String, Arc<ReplicaNode>>,
    down: DashSet<String>,
    delays: DashMap<&'static str, Duration>,
}

impl LocalCluster {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            nodes: DashMap::new(),
            down: DashSet::new(),
            delays: DashMap::new(),
        })
    }

    pub fn node(&self, name: &str) -> Option<Arc<ReplicaNode>> {
        self.nodes.get(name).map(|n| n.value().clone())
    }

    /// Makes `name` unreachable without dropping its state.
    pub fn kill(&self, name: &str) {
        self.down.insert(name.to_string());
    }

    pub fn revive(&self, name: &str) {
        self.down.remove(name);
    }

    pub fn is_down(&self, name: &str) -> bool {
        self.down.contains(name)
    }

    /// Delays every later `op` ("copy" or "start") by `delay`.
    pub fn slow_down(&self, op: &'static str, delay: Duration) {
        self.delays.insert(op, delay);
    }

    async fn stall(&self, op: &str) {
        let delay = self.delays.get(op).map(|d| *d.value());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn fresh_node(&self, name: &str) -> Arc<ReplicaNode> {
        let peers = Arc::new(LocalPeers(self.me.clone()));
        Arc::new(
            ReplicaNode::new(name, Arc::new(MemoryTableStore::new()), peers)
                .with_retry(fast_retry()),
        )
    }

    fn reach(&self, server: &str) -> Result<Arc<ReplicaNode>> {
        let unreachable = || ClusterError::Unreachable {
            server: server.to_string(),
            reason: "connection refused".to_string(),
        };
        if self.is_down(server) {
            return Err(unreachable());
        }
        self.node(server).ok_or_else(unreachable)
    }
}

#[async_trait]
impl ReplicaClient for LocalCluster {
    async fn heartbeat(&self, server: &str) -> Result<()> {
        self.reach(server)?.heartbeat()
    }

    async fn configure(&self, server: &str, request: &ConfigRequest) -> Result<MessageResponse> {
        self.reach(server)?.configure(request.clone()).await
    }

    async fn add_shard(&self, server: &str, shard: &str) -> Result<MessageResponse> {
        self.reach(server)?.add_shard(shard).await
    }

    async fn copy(&self, server: &str, shard: &str) -> Result<Snapshot> {
        self.stall("copy").await;
        self.reach(server)?.snapshot(shard).await
    }

    async fn log_length(&self, server: &str, shard: &str) -> Result<usize> {
        self.reach(server)?.log_length(shard).await
    }

    async fn read(&self, server: &str, request: &ReadRequest) -> Result<Vec<StudentRecord>> {
        self.reach(server)?.read(request).await
    }

    async fn mutate(
        &self,
        server: &str,
        mutation: &Mutation,
        sequence: Option<Sequence>,
    ) -> Result<MessageResponse> {
        self.reach(server)?.mutate(mutation.clone(), sequence).await
    }

    async fn update_primaries(&self, server: &str, update: &PrimaryUpdate) -> Result<()> {
        self.reach(server)?.update_primaries(update.clone()).await;
        Ok(())
    }

    async fn dump(&self, server: &str) -> Result<ShardDump> {
        self.reach(server)?.dump_all().await
    }
}

#[async_trait]
impl Provisioner for LocalCluster {
    async fn start(&self, name: &str) -> Result<String> {
        self.stall("start").await;
        self.nodes.insert(name.to_string(), self.fresh_node(name));
        self.down.remove(name);
        Ok(format!("local://{}", name))
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.nodes.remove(name);
        Ok(())
    }
}

/// A replica's handle back into the cluster. Weak so nodes do not keep the
/// cluster alive.
struct LocalPeers(Weak<LocalCluster>);

impl LocalPeers {
    fn cluster(&self) -> Result<Arc<LocalCluster>> {
        self.0.upgrade().ok_or(ClusterError::Cancelled)
    }
}

#[async_trait]
impl ReplicaClient for LocalPeers {
    async fn heartbeat(&self, server: &str) -> Result<()> {
        self.cluster()?.heartbeat(server).await
    }

    async fn configure(&self, server: &str, request: &ConfigRequest) -> Result<MessageResponse> {
        self.cluster()?.configure(server, request).await
    }

    async fn add_shard(&self, server: &str, shard: &str) -> Result<MessageResponse> {
        self.cluster()?.add_shard(server, shard).await
    }

    async fn copy(&self, server: &str, shard: &str) -> Result<Snapshot> {
        self.cluster()?.copy(server, shard).await
    }

    async fn log_length(&self, server: &str, shard: &str) -> Result<usize> {
        self.cluster()?.log_length(server, shard).await
    }

    async fn read(&self, server: &str, request: &ReadRequest) -> Result<Vec<StudentRecord>> {
        self.cluster()?.read(server, request).await
    }

    async fn mutate(
        &self,
        server: &str,
        mutation: &Mutation,
        sequence: Option<Sequence>,
    ) -> Result<MessageResponse> {
        self.cluster()?.mutate(server, mutation, sequence).await
    }

    async fn update_primaries(&self, server: &str, update: &PrimaryUpdate) -> Result<()> {
        self.cluster()?.update_primaries(server, update).await
    }

    async fn dump(&self, server: &str) -> Result<ShardDump> {
        self.cluster()?.dump(server).await
    }
}

#[async_trait]
impl ManagerClient for ShardManager {
    async fn init(&self, request: &InitRequest) -> Result<ManagerResponse> {
        ShardManager::init(self, request.clone()).await
    }

    async fn add(&self, request: &AddRequest) -> Result<ManagerResponse> {
        ShardManager::add(self, request.clone()).await
    }

    async fn remove(&self, request: &RemoveRequest) -> Result<ManagerResponse> {
        ShardManager::remove(self, request.clone()).await
    }

    async fn primary_map(&self) -> Result<PrimaryMap> {
        Ok(ShardManager::primary_map(self).await)
    }
}

/// Cluster, manager and balancer wired together in-process.
pub struct Harness {
    pub cluster: Arc<LocalCluster>,
    pub manager: Arc<ShardManager>,
    pub balancer: Arc<LoadBalancer>,
}

impl Harness {
    pub fn new() -> Self {
        let cluster = LocalCluster::new();
        let manager = Arc::new(
            ShardManager::new(cluster.clone(), cluster.clone()).with_retry(fast_retry()),
        );
        let balancer = Arc::new(
            LoadBalancer::new(manager.clone(), cluster.clone()).with_retry(fast_retry()),
        );
        Self {
            cluster,
            manager,
            balancer,
        }
    }
}

pub fn shard(id: &str, low: i64, size: i64) -> ShardSpec {
    ShardSpec::new(id, low, size)
}

/// `("s1", "sh1 sh2")` → s1 hosts sh1 and sh2.
pub fn layout(entries: &[(&str, &str)]) -> ServerShards {
    entries
        .iter()
        .map(|(server, shards)| {
            (
                server.to_string(),
                shards.split_whitespace().map(str::to_string).collect(),
            )
        })
        .collect()
}

/// Two shards of 100 ids each, both replicated on s1 and s2.
pub fn two_shard_init() -> InitRequest {
    InitRequest {
        n: Some(2),
        shards: vec![shard("sh1", 0, 100), shard("sh2", 100, 100)],
        servers: layout(&[("s1", "sh1 sh2"), ("s2", "sh1 sh2")]),
    }
}

pub fn student(id: i64, marks: i64) -> StudentRecord {
    StudentRecord::new(id, format!("student-{}", id), marks)
}
