use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock, watch};

use super::protocol::*;
use super::types::{ShardMetadata, ShardState};
use crate::error::{ClusterError, Result};
use crate::manager::ManagerClient;
use crate::manager::protocol::{AddRequest, InitRequest, RemoveRequest};
use crate::membership::ServerShards;
use crate::net::{AddressBook, RetryPolicy};
use crate::replica::ReplicaClient;
use crate::replica::protocol::*;
use crate::store::{RecordId, StudentRecord};
use crate::wal::Sequence;

type ShardGuards = BTreeMap<String, OwnedRwLockWriteGuard<ShardState>>;

/// Client-facing router. Owns the shard table, each shard's replica ring and
/// request counter, and delegates provisioning and election to the manager.
pub struct LoadBalancer {
    shards: RwLock<BTreeMap<String, Arc<ShardMetadata>>>,
    server_shards: RwLock<BTreeMap<String, BTreeSet<String>>>,
    // Serializes init/add/rm against each other.
    admin: Mutex<()>,
    manager: Arc<dyn ManagerClient>,
    replicas: Arc<dyn ReplicaClient>,
    addresses: Arc<AddressBook>,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
}

impl LoadBalancer {
    pub fn new(manager: Arc<dyn ManagerClient>, replicas: Arc<dyn ReplicaClient>) -> Self {
        let (_, shutdown) = watch::channel(false);
        Self {
            shards: RwLock::new(BTreeMap::new()),
            server_shards: RwLock::new(BTreeMap::new()),
            admin: Mutex::new(()),
            manager,
            replicas,
            addresses: Arc::new(AddressBook::default()),
            retry: RetryPolicy::default(),
            shutdown,
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

    pub async fn is_configured(&self) -> bool {
        !self.shards.read().await.is_empty()
    }

    async fn shard(&self, id: &str) -> Option<Arc<ShardMetadata>> {
        self.shards.read().await.get(id).cloned()
    }

    async fn shard_list(&self) -> Vec<Arc<ShardMetadata>> {
        self.shards.read().await.values().cloned().collect()
    }

    /// The shard whose range contains `key`. Ranges are disjoint, so the
    /// first match is the only one.
    async fn shard_for(&self, key: RecordId) -> Result<Arc<ShardMetadata>> {
        self.shards
            .read()
            .await
            .values()
            .find(|meta| meta.spec.contains(key))
            .cloned()
            .ok_or_else(|| ClusterError::invalid(format!("No shard found for Stud_id: {}", key)))
    }

    /// A replica of `shard` chosen by its ring.
    pub async fn pick_replica(&self, shard: &str) -> Result<String> {
        let meta = self
            .shard(shard)
            .await
            .ok_or_else(|| ClusterError::UnknownShard(shard.to_string()))?;
        let state = meta.state.read().await;
        state
            .ring
            .pick()
            .map(str::to_string)
            .ok_or_else(|| ClusterError::NoPrimary(shard.to_string()))
    }

    /// Write-locks the listed shards in id order. Unknown ids are skipped.
    async fn lock_shards(&self, ids: &BTreeSet<String>) -> ShardGuards {
        let mut guards = ShardGuards::new();
        for id in ids {
            if let Some(meta) = self.shard(id).await {
                guards.insert(id.clone(), meta.state.clone().write_owned().await);
            }
        }
        guards
    }

    // ============================================================
    // ADMINISTRATION
    // ============================================================

    pub async fn init(&self, request: InitRequest) -> Result<MessageResponse> {
        let _admin = self.admin.lock().await;
        if self.is_configured().await {
            return Err(ClusterError::invalid("Database already configured"));
        }

        let defined: BTreeSet<&str> = request.shards.iter().map(|s| s.id.as_str()).collect();
        if request
            .servers
            .values()
            .flatten()
            .any(|id| !defined.contains(id.as_str()))
        {
            return Err(ClusterError::invalid("<Error> Shard not found"));
        }

        let response = self.manager.init(&request).await?;
        self.addresses.merge(&response.addresses);

        let mut shards = BTreeMap::new();
        for spec in &request.shards {
            shards.insert(spec.id.clone(), Arc::new(ShardMetadata::new(spec.clone())));
        }
        for (server, ids) in &request.servers {
            for id in ids {
                if let Some(meta) = shards.get(id) {
                    meta.state.write().await.add_replica(server);
                }
            }
        }

        *self.server_shards.write().await = request
            .servers
            .iter()
            .map(|(server, ids)| (server.clone(), ids.iter().cloned().collect()))
            .collect();
        *self.shards.write().await = shards;

        tracing::info!(
            "Configured {} shards on {} servers",
            request.shards.len(),
            request.servers.len()
        );
        Ok(MessageResponse::success("Configured Database"))
    }

    pub async fn add(&self, request: AddRequest) -> Result<AddResponse> {
        let _admin = self.admin.lock().await;

        let fresh: BTreeMap<String, Arc<ShardMetadata>> = {
            let shards = self.shards.read().await;
            let fresh: BTreeMap<_, _> = request
                .new_shards
                .iter()
                .filter(|spec| !shards.contains_key(&spec.id))
                .map(|spec| (spec.id.clone(), Arc::new(ShardMetadata::new(spec.clone()))))
                .collect();
            if request
                .servers
                .values()
                .flatten()
                .any(|id| !shards.contains_key(id) && !fresh.contains_key(id))
            {
                return Err(ClusterError::invalid("<Error> Shard not found"));
            }
            fresh
        };

        let affected: BTreeSet<String> = request.servers.values().flatten().cloned().collect();
        let mut guards = self.lock_shards(&affected).await;

        let response = self.manager.add(&request).await?;
        self.addresses.merge(&response.addresses);

        let mut server_shards = self.server_shards.write().await;
        for (server, ids) in &request.servers {
            for id in ids {
                if let Some(state) = guards.get_mut(id) {
                    state.add_replica(server);
                } else if let Some(meta) = fresh.get(id) {
                    meta.state.write().await.add_replica(server);
                }
            }
            server_shards
                .entry(server.clone())
                .or_default()
                .extend(ids.iter().cloned());
        }
        let n = server_shards.len();
        drop(server_shards);

        self.shards.write().await.extend(fresh);
        drop(guards);

        let names: Vec<&str> = request.servers.keys().map(String::as_str).collect();
        tracing::info!("Added servers {:?}", names);
        Ok(AddResponse {
            n,
            message: format!("Add Server:{}", names.join(" and ")),
            status: "success".to_string(),
        })
    }

    /// Removes `n` servers: the named ones plus random others. Shards that
    /// would be left without any replica are first handed to a randomly
    /// chosen surviving server.
    pub async fn remove(&self, request: RemoveRequest) -> Result<RemoveResponse> {
        let _admin = self.admin.lock().await;

        if request.n == 0 {
            return Err(ClusterError::invalid(
                "<Error> Number of Servers to Remove cannot be zero",
            ));
        }
        let named: BTreeSet<String> = request.servers.iter().cloned().collect();
        if named.len() > request.n {
            return Err(ClusterError::invalid(
                "<Error> Length of server list is more than removable instances",
            ));
        }
        let server_shards = self.server_shards.read().await.clone();
        if request.n >= server_shards.len() {
            return Err(ClusterError::invalid("<Error> Cannot remove all servers"));
        }
        if let Some(unknown) = named.iter().find(|s| !server_shards.contains_key(*s)) {
            return Err(ClusterError::UnknownServer(unknown.clone()));
        }

        let mut survivors: Vec<String> = server_shards
            .keys()
            .filter(|s| !named.contains(*s))
            .cloned()
            .collect();
        survivors.shuffle(&mut rand::thread_rng());
        let mut removed: Vec<String> = named.into_iter().collect();
        let extra = request.n - removed.len();
        removed.extend(survivors.drain(..extra));
        removed.sort();
        let backup = survivors.choose(&mut rand::thread_rng()).cloned();

        let orphans: Vec<String> = self
            .shards
            .read()
            .await
            .keys()
            .filter(|id| !survivors.iter().any(|s| server_shards[s].contains(*id)))
            .cloned()
            .collect();

        let mut affected: BTreeSet<String> = orphans.iter().cloned().collect();
        for server in &removed {
            affected.extend(server_shards[server].iter().cloned());
        }
        let mut guards = self.lock_shards(&affected).await;

        if !orphans.is_empty()
            && let Some(backup) = backup
        {
            tracing::info!("{} takes over orphaned shards {:?}", backup, orphans);
            let takeover = AddRequest {
                n: Some(0),
                new_shards: Vec::new(),
                servers: ServerShards::from([(backup.clone(), orphans.clone())]),
            };
            let response = self.manager.add(&takeover).await?;
            self.addresses.merge(&response.addresses);

            for id in &orphans {
                if let Some(state) = guards.get_mut(id) {
                    state.add_replica(&backup);
                }
            }
            self.server_shards
                .write()
                .await
                .entry(backup)
                .or_default()
                .extend(orphans.iter().cloned());
        }

        let removal = RemoveRequest {
            n: removed.len(),
            servers: removed.clone(),
        };
        self.manager.remove(&removal).await?;

        for state in guards.values_mut() {
            for server in &removed {
                state.remove_replica(server);
            }
        }
        let n = {
            let mut server_shards = self.server_shards.write().await;
            for server in &removed {
                server_shards.remove(server);
                self.addresses.forget(server);
            }
            server_shards.len()
        };
        drop(guards);

        tracing::info!("Removed servers {:?}", removed);
        Ok(RemoveResponse {
            n,
            servers: removed,
            status: "success".to_string(),
        })
    }

    pub async fn status(&self) -> StatusResponse {
        let shards = self
            .shard_list()
            .await
            .iter()
            .map(|meta| meta.spec.clone())
            .collect();
        let servers: ServerShards = self
            .server_shards
            .read()
            .await
            .iter()
            .map(|(server, ids)| (server.clone(), ids.iter().cloned().collect()))
            .collect();
        StatusResponse {
            n: servers.len(),
            shards,
            servers,
        }
    }

    // ============================================================
    // DATA PATH
    // ============================================================

    /// Queries one ring-chosen replica per intersecting shard. A shard whose
    /// replica fails is reported in `status` instead of failing the read.
    pub async fn read(&self, range: KeyRange) -> ReadResult {
        let mut result = ReadResult {
            shards_queried: Vec::new(),
            data: Vec::new(),
            status: String::new(),
        };
        let mut failed = Vec::new();

        for meta in self.shard_list().await {
            let Some((low, high)) = meta.spec.intersect(range.low, range.high) else {
                continue;
            };
            let shard = meta.spec.id.clone();
            let state = meta.state.read().await;
            let Some(server) = state.ring.pick().map(str::to_string) else {
                tracing::error!("Shard {} has no replicas to read from", shard);
                failed.push(shard);
                continue;
            };

            tracing::debug!("Reading [{}, {}) of shard {} from {}", low, high, shard, server);
            let request = ReadRequest {
                shard: shard.clone(),
                range: KeyRange { low, high },
            };
            match self.replicas.read(&server, &request).await {
                Ok(rows) => {
                    result.shards_queried.push(shard);
                    result.data.extend(rows);
                }
                Err(e) => {
                    tracing::warn!("Read of shard {} from {} failed: {}", shard, server, e);
                    failed.push(shard);
                }
            }
        }

        result.status = if failed.is_empty() {
            "success".to_string()
        } else {
            format!("{} failed", failed.join(" "))
        };
        result
    }

    pub async fn write(
        &self,
        rows: Vec<StudentRecord>,
        sequence: Option<Sequence>,
    ) -> Result<MessageResponse> {
        let shards = self.shard_list().await;
        let count = rows.len();

        let mut grouped: BTreeMap<String, (Arc<ShardMetadata>, Vec<StudentRecord>)> =
            BTreeMap::new();
        for row in rows {
            let meta = shards
                .iter()
                .find(|meta| meta.spec.contains(row.stud_id))
                .ok_or_else(|| {
                    ClusterError::invalid(format!("No shard found for Stud_id: {}", row.stud_id))
                })?;
            grouped
                .entry(meta.spec.id.clone())
                .or_insert_with(|| (meta.clone(), Vec::new()))
                .1
                .push(row);
        }

        for (shard, (meta, data)) in grouped {
            let mutation = Mutation::Write(WriteRequest { shard, data });
            self.route_mutation(&meta, mutation, sequence).await?;
        }
        Ok(MessageResponse::success(format!("{} Data entries added", count)))
    }

    pub async fn update(
        &self,
        query: UpdateQuery,
        sequence: Option<Sequence>,
    ) -> Result<MessageResponse> {
        if query.data.stud_id != query.stud_id {
            return Err(ClusterError::invalid("Stud_id of data does not match Stud_id"));
        }
        let meta = self.shard_for(query.stud_id).await?;
        let mutation = Mutation::Update(UpdateRequest {
            shard: meta.spec.id.clone(),
            stud_id: query.stud_id,
            data: query.data,
        });
        self.route_mutation(&meta, mutation, sequence).await?;
        Ok(MessageResponse::success(format!(
            "Data entry for Stud_id: {} updated",
            query.stud_id
        )))
    }

    pub async fn delete(
        &self,
        query: DeleteQuery,
        sequence: Option<Sequence>,
    ) -> Result<MessageResponse> {
        let meta = self.shard_for(query.stud_id).await?;
        let mutation = Mutation::Delete(DeleteRequest {
            shard: meta.spec.id.clone(),
            stud_id: query.stud_id,
        });
        self.route_mutation(&meta, mutation, sequence).await?;
        Ok(MessageResponse::success(format!(
            "Data entry for Stud_id: {} removed from all replicas",
            query.stud_id
        )))
    }

    /// Sends a mutation to the shard's current primary under the shard's
    /// write lock. The primary is looked up again on every attempt, so a
    /// retry after failover reaches the newly elected one with the same
    /// sequence number.
    async fn route_mutation(
        &self,
        meta: &ShardMetadata,
        mutation: Mutation,
        requested: Option<Sequence>,
    ) -> Result<MessageResponse> {
        let shard = meta.spec.id.as_str();
        let mut state = meta.state.write().await;
        let sequence = state.next_sequence(requested);

        let what = format!("{} on shard {} (sequence {})", mutation.endpoint(), shard, sequence);
        let mutation = &mutation;
        let outcome = self
            .retry
            .run(&what, &self.shutdown, |attempt| async move {
                let primaries = self.manager.primary_map().await?;
                let primary = primaries
                    .primary_of(shard)
                    .ok_or_else(|| ClusterError::NoPrimary(shard.to_string()))?
                    .to_string();
                tracing::debug!("{} attempt {} via {}", mutation.endpoint(), attempt, primary);
                self.replicas.mutate(&primary, mutation, Some(sequence)).await
            })
            .await;

        drop(state);
        outcome
    }

    /// Every shard a server hosts, as the server itself reports it.
    pub async fn dump(&self, server: &str) -> Result<ShardDump> {
        if !self.server_shards.read().await.contains_key(server) {
            return Err(ClusterError::UnknownServer(server.to_string()));
        }
        self.replicas.dump(server).await
    }
}
