use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::MissedTickBehavior;

use super::protocol::*;
use super::provisioner::Provisioner;
use crate::error::Result;
use crate::membership::PrimaryMap;
use crate::net::{AddressBook, RetryPolicy, cancelled};
use crate::replica::ReplicaClient;
use crate::replica::protocol::{ConfigRequest, PrimaryUpdate};

/// Control plane: owns shard membership and primary assignment, provisions
/// replicas and repairs them when they stop answering heartbeats.
pub struct ShardManager {
    membership: RwLock<PrimaryMap>,
    running: DashMap<String, String>,
    replicas: Arc<dyn ReplicaClient>,
    provisioner: Arc<dyn Provisioner>,
    addresses: Arc<AddressBook>,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    // Serializes membership changes (init/add/rm) with heartbeat repair.
    repair_lock: Mutex<()>,
}

impl ShardManager {
    pub fn new(replicas: Arc<dyn ReplicaClient>, provisioner: Arc<dyn Provisioner>) -> Self {
        let (_, shutdown) = watch::channel(false);
        Self {
            membership: RwLock::new(PrimaryMap::new()),
            running: DashMap::new(),
            replicas,
            provisioner,
            addresses: Arc::new(AddressBook::default()),
            retry: RetryPolicy::default(),
            shutdown,
            repair_lock: Mutex::new(()),
        }
    }

    pub fn with_addresses(mut self, addresses: Arc<AddressBook>) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn primary_map(&self) -> PrimaryMap {
        self.membership.read().await.clone()
    }

    pub fn is_running(&self, server: &str) -> bool {
        self.running.contains_key(server)
    }

    // ============================================================
    // ADMINISTRATION
    // ============================================================

    pub async fn init(&self, request: InitRequest) -> Result<ManagerResponse> {
        let _guard = self.repair_lock.lock().await;

        let mut addresses = BTreeMap::new();
        for server in request.servers.keys() {
            addresses.insert(server.clone(), self.spawn(server).await?);
        }
        for (server, shards) in &request.servers {
            self.configure(server, shards).await?;
        }

        {
            let mut membership = self.membership.write().await;
            for shard in &request.shards {
                membership.add_shard(&shard.id);
            }
            for (server, shards) in &request.servers {
                for shard in shards {
                    membership.add_member(shard, server);
                }
            }
        }

        for shard in &request.shards {
            self.elect(&shard.id).await;
        }
        self.broadcast().await;

        Ok(ManagerResponse::success("Configured Database", addresses))
    }

    /// Spawns servers that are not running yet and hosts additional shards on
    /// the ones that are.
    pub async fn add(&self, request: AddRequest) -> Result<ManagerResponse> {
        let _guard = self.repair_lock.lock().await;

        {
            let mut membership = self.membership.write().await;
            for shard in &request.new_shards {
                membership.add_shard(&shard.id);
            }
        }

        let mut addresses = BTreeMap::new();
        let mut spawned = Vec::new();
        for (server, shards) in &request.servers {
            if self.is_running(server) {
                self.extend(server, shards).await?;
            } else {
                addresses.insert(server.clone(), self.spawn(server).await?);
                spawned.push(server);
            }
        }

        for server in spawned {
            let shards = &request.servers[server];
            self.configure(server, shards).await?;
            let mut membership = self.membership.write().await;
            for shard in shards {
                membership.add_member(shard, server);
            }
        }

        self.elect_orphaned().await;
        self.broadcast().await;

        Ok(ManagerResponse::success("Added new servers", addresses))
    }

    /// Hosts `shards` on an already running server, skipping shards it
    /// already has.
    async fn extend(&self, server: &str, shards: &[String]) -> Result<()> {
        for shard in shards {
            if self.membership.read().await.contains(shard, server) {
                continue;
            }
            let what = format!("add shard {} to {}", shard, server);
            self.retry
                .run(&what, &self.shutdown, |_| self.replicas.add_shard(server, shard))
                .await?;
            self.membership.write().await.add_member(shard, server);
            tracing::info!("{} now hosts shard {}", server, shard);
        }
        Ok(())
    }

    pub async fn remove(&self, request: RemoveRequest) -> Result<ManagerResponse> {
        let _guard = self.repair_lock.lock().await;

        for server in &request.servers {
            self.membership.write().await.remove_server(server);
            self.running.remove(server);
            if let Err(e) = self.provisioner.stop(server).await {
                tracing::warn!("Error removing server {}: {}", server, e);
            }
            tracing::info!("{} removed", server);
        }

        self.elect_orphaned().await;
        self.broadcast().await;

        Ok(ManagerResponse::success("Removed servers", BTreeMap::new()))
    }

    // ============================================================
    // PROVISIONING
    // ============================================================

    async fn spawn(&self, server: &str) -> Result<String> {
        let address = self.provisioner.start(server).await?;
        self.addresses.register(server, &address);
        self.running.insert(server.to_string(), address.clone());
        Ok(address)
    }

    /// Sends the shard list to a freshly started replica, retrying while it
    /// boots. Shards with live members are copied from them by the replica.
    async fn configure(&self, server: &str, shards: &[String]) -> Result<()> {
        let request = ConfigRequest {
            shards: shards.to_vec(),
            map_data: self.membership.read().await.clone(),
            addresses: self.addresses.snapshot(),
        };
        let what = format!("configure {}", server);
        let response = self
            .retry
            .run(&what, &self.shutdown, |_| self.replicas.configure(server, &request))
            .await?;
        tracing::info!("{}", response.message);
        Ok(())
    }

    /// Publishes the current membership to every member.
    pub async fn broadcast(&self) {
        let update = PrimaryUpdate {
            map_data: self.membership.read().await.clone(),
            addresses: self.addresses.snapshot(),
        };
        for server in update.map_data.servers() {
            if let Err(e) = self.replicas.update_primaries(&server, &update).await {
                tracing::warn!("Failed to update primary map on {}: {}", server, e);
            }
        }
    }

    // ============================================================
    // ELECTION
    // ============================================================

    pub async fn elect(&self, shard: &str) -> Option<String> {
        self.elect_excluding(shard, &[]).await
    }

    /// Elects the member of `shard` with the strictly longest log, ignoring
    /// `excluded` and members that do not answer. Ties go to the lowest
    /// server id. With no candidate left the shard is left without primary.
    pub async fn elect_excluding(&self, shard: &str, excluded: &[String]) -> Option<String> {
        let members = self.membership.read().await.members(shard);

        let mut best: Option<(String, usize)> = None;
        for server in members.into_iter().filter(|m| !excluded.contains(m)) {
            match self.replicas.log_length(&server, shard).await {
                Ok(length) => {
                    tracing::debug!("{} has log length {} for shard {}", server, length, shard);
                    if best.as_ref().is_none_or(|(_, longest)| length > *longest) {
                        best = Some((server, length));
                    }
                }
                Err(e) => {
                    tracing::warn!("Error getting log length from {}: {}", server, e);
                }
            }
        }

        let mut membership = self.membership.write().await;
        match best {
            Some((winner, length)) => {
                membership.set_primary(shard, &winner);
                tracing::info!(
                    "{} elected as primary for shard {} (log length {})",
                    winner,
                    shard,
                    length
                );
                Some(winner)
            }
            None => {
                membership.clear_primary(shard);
                tracing::warn!("No servers available to elect for shard {}", shard);
                None
            }
        }
    }

    async fn elect_orphaned(&self) {
        let orphaned = self.membership.read().await.shards_without_primary();
        for shard in orphaned {
            self.elect(&shard).await;
        }
    }

    // ============================================================
    // HEARTBEAT & REPAIR
    // ============================================================

    /// Probes every member once. Each unreachable server has its primaries
    /// re-elected among the survivors, is restarted under the same name,
    /// resynced and re-added as a secondary. Returns the repaired servers.
    pub async fn check_heartbeats(&self) -> Vec<String> {
        let _guard = self.repair_lock.lock().await;

        let servers = self.membership.read().await.servers();
        let mut failed = Vec::new();
        for server in servers {
            if let Err(e) = self.replicas.heartbeat(&server).await {
                tracing::warn!("Error getting heartbeat from {}: {}", server, e);
                failed.push(server);
            }
        }
        if failed.is_empty() {
            return failed;
        }

        for server in &failed {
            let led = self.membership.read().await.primary_shards_of(server);
            for shard in led {
                self.elect_excluding(&shard, &failed).await;
            }
        }
        // New primaries forward to their secondaries while replacements boot.
        self.broadcast().await;

        let assignments: BTreeMap<String, Vec<String>> = {
            let mut membership = self.membership.write().await;
            failed
                .iter()
                .map(|server| {
                    let shards = membership.shards_of(server);
                    membership.remove_server(server);
                    (server.clone(), shards)
                })
                .collect()
        };

        for (server, shards) in &assignments {
            if let Err(e) = self.replace(server, shards).await {
                tracing::error!("Failed to replace {}: {}", server, e);
            }
            // Re-added even on failure so the next tick retries it.
            let mut membership = self.membership.write().await;
            for shard in shards {
                membership.add_member(shard, server);
            }
        }

        self.elect_orphaned().await;
        self.broadcast().await;
        failed
    }

    async fn replace(&self, server: &str, shards: &[String]) -> Result<()> {
        if let Err(e) = self.provisioner.stop(server).await {
            tracing::warn!("Error stopping {}: {}", server, e);
        }
        self.spawn(server).await?;
        self.configure(server, shards).await?;
        tracing::info!("{} replaced and resynced ({} shards)", server, shards.len());
        Ok(())
    }

    /// Heartbeat loop. A tick that fires while the previous check is still
    /// running is skipped.
    pub async fn run_heartbeat(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancelled(&mut shutdown) => {
                    tracing::info!("Heartbeat loop stopped");
                    return;
                }
            }

            let repaired = self.check_heartbeats().await;
            if !repaired.is_empty() {
                tracing::info!("Heartbeat repaired {:?}", repaired);
            }
        }
    }
}
