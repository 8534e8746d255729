use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock, watch};

use super::client::ReplicaClient;
use super::protocol::*;
use crate::error::{ClusterError, Result};
use crate::membership::PrimaryMap;
use crate::net::{AddressBook, RetryPolicy};
use crate::store::{StudentRecord, TableStore};
use crate::wal::{LogEntry, Sequence, WriteAheadLog};

type SharedLog = Arc<Mutex<WriteAheadLog>>;

/// One replica process: a write-ahead log and a storage table per hosted
/// shard, plus its view of who is primary for what.
pub struct ReplicaNode {
    name: String,
    data_dir: Option<PathBuf>,
    store: Arc<dyn TableStore>,
    shards: DashMap<String, SharedLog>,
    primaries: RwLock<PrimaryMap>,
    peers: Arc<dyn ReplicaClient>,
    addresses: Arc<AddressBook>,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    configured: AtomicBool,
}

impl ReplicaNode {
    pub fn new(name: &str, store: Arc<dyn TableStore>, peers: Arc<dyn ReplicaClient>) -> Self {
        // Sender dropped immediately: never cancelled unless `with_shutdown`.
        let (_, shutdown) = watch::channel(false);
        Self {
            name: name.to_string(),
            data_dir: None,
            store,
            shards: DashMap::new(),
            primaries: RwLock::new(PrimaryMap::new()),
            peers,
            addresses: Arc::new(AddressBook::default()),
            retry: RetryPolicy::default(),
            shutdown,
            configured: AtomicBool::new(false),
        }
    }

    /// Persist logs under `dir` instead of keeping them in memory only.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
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

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    pub fn hosted_shards(&self) -> Vec<String> {
        let mut shards: Vec<String> = self.shards.iter().map(|e| e.key().clone()).collect();
        shards.sort();
        shards
    }

    pub async fn primary_map(&self) -> PrimaryMap {
        self.primaries.read().await.clone()
    }

    fn log_of(&self, shard: &str) -> Result<SharedLog> {
        self.shards
            .get(shard)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ClusterError::UnknownShard(shard.to_string()))
    }

    // ============================================================
    // HEALTH & METADATA
    // ============================================================

    pub fn heartbeat(&self) -> Result<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(ClusterError::NotConfigured)
        }
    }

    /// Commit index of the shard's log: the freshness measure for election.
    pub async fn log_length(&self, shard: &str) -> Result<usize> {
        let log = self.log_of(shard)?;
        let wal = log.lock().await;
        Ok(wal.len())
    }

    /// Replaces the membership view with the manager's broadcast.
    pub async fn update_primaries(&self, update: PrimaryUpdate) {
        self.addresses.merge(&update.addresses);
        let mut primaries = self.primaries.write().await;
        *primaries = update.map_data;
        tracing::debug!("{}: primary map updated ({} shards)", self.name, primaries.shards().count());
    }

    // ============================================================
    // CONFIGURATION & CATCH-UP
    // ============================================================

    /// Hosts every listed shard, catching each one up from a live member when
    /// one exists. Shards already hosted are left alone, so a repeated
    /// configuration is harmless.
    pub async fn configure(&self, request: ConfigRequest) -> Result<MessageResponse> {
        self.addresses.merge(&request.addresses);
        if !request.map_data.is_empty() {
            *self.primaries.write().await = request.map_data;
        }

        let mut configured = Vec::new();
        for shard in &request.shards {
            if !self.shards.contains_key(shard) {
                self.host_shard(shard).await?;
            }
            configured.push(format!("{}:{}", self.name, shard));
        }

        self.configured.store(true, Ordering::SeqCst);
        tracing::info!("{} configured with shards {:?}", self.name, request.shards);
        Ok(MessageResponse::success(format!(
            "{} configured",
            configured.join(", ")
        )))
    }

    /// Starts hosting one more shard on a running replica.
    pub async fn add_shard(&self, shard: &str) -> Result<MessageResponse> {
        if shard.is_empty() {
            return Err(ClusterError::invalid("Shard not provided"));
        }
        if self.shards.contains_key(shard) {
            return Err(ClusterError::invalid(format!("Shard {} already exists", shard)));
        }
        self.host_shard(shard).await?;
        self.configured.store(true, Ordering::SeqCst);
        Ok(MessageResponse::success("Shard added"))
    }

    async fn host_shard(&self, shard: &str) -> Result<()> {
        let sources = self.catch_up_sources(shard).await;

        let wal = match (&self.data_dir, sources.is_empty()) {
            (None, _) => WriteAheadLog::in_memory(shard),
            (Some(dir), true) => WriteAheadLog::open(dir, shard).await?,
            (Some(dir), false) => WriteAheadLog::create(dir, shard).await?,
        };

        // Published locked: mutations for the shard wait until catch-up ends.
        let log: SharedLog = Arc::new(Mutex::new(wal));
        let mut guard = log.clone().lock_owned().await;
        self.shards.insert(shard.to_string(), log);

        let outcome = if sources.is_empty() {
            self.recover(&mut guard).await
        } else {
            self.catch_up(&mut guard, &sources).await
        };

        if let Err(e) = outcome {
            drop(guard);
            self.shards.remove(shard);
            tracing::error!("{}: failed to host shard {}: {}", self.name, shard, e);
            return Err(e);
        }
        Ok(())
    }

    /// Primary first, then every other member, never ourselves.
    async fn catch_up_sources(&self, shard: &str) -> Vec<String> {
        let primaries = self.primaries.read().await;
        let mut sources = Vec::new();
        if let Some(primary) = primaries.primary_of(shard)
            && primary != self.name
        {
            sources.push(primary.to_string());
        }
        for member in primaries.members(shard) {
            if member != self.name && !sources.contains(&member) {
                sources.push(member);
            }
        }
        sources
    }

    /// Replays whatever a previous run left in the log.
    async fn recover(&self, wal: &mut WriteAheadLog) -> Result<()> {
        let shard = wal.shard().to_string();
        self.store.migrate(&shard).await?;
        if wal.is_empty() {
            return Ok(());
        }
        if !self.store.is_persistent() {
            wal.set_applied(0).await?;
        }
        let report = wal.replay(self.store.as_ref()).await?;
        tracing::info!(
            "{}: recovered shard {} from its log ({} entries replayed)",
            self.name,
            shard,
            report.applied
        );
        Ok(())
    }

    async fn catch_up(&self, wal: &mut WriteAheadLog, sources: &[String]) -> Result<()> {
        let shard = wal.shard().to_string();
        let mut last_error = None;

        for source in sources {
            match self.peers.copy(source, &shard).await {
                Ok(snapshot) => {
                    tracing::info!(
                        "{}: copying shard {} from {} ({} rows, {} log entries, commit index {})",
                        self.name,
                        shard,
                        source,
                        snapshot.data.len(),
                        snapshot.logs.len(),
                        snapshot.commit_index
                    );
                    return self.install_snapshot(wal, snapshot).await;
                }
                Err(e) => {
                    tracing::warn!("{}: copy of {} from {} failed: {}", self.name, shard, source, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ClusterError::NoPrimary(shard)))
    }

    /// Bulk-loads the rows, appends the received log, moves the cursor to the
    /// source's commit index and replays the remainder.
    async fn install_snapshot(&self, wal: &mut WriteAheadLog, snapshot: Snapshot) -> Result<()> {
        let shard = wal.shard().to_string();
        self.store.drop_table(&shard).await?;
        self.store.migrate(&shard).await?;
        if !snapshot.data.is_empty() {
            self.store.insert(&shard, &snapshot.data).await?;
        }

        wal.append_batch(snapshot.logs).await?;
        wal.set_applied(snapshot.commit_index).await?;
        wal.replay(self.store.as_ref()).await?;
        Ok(())
    }

    /// Rows, full log and replay cursor of a shard, taken under the log lock
    /// so the three agree.
    pub async fn snapshot(&self, shard: &str) -> Result<Snapshot> {
        let log = self.log_of(shard)?;
        let wal = log.lock().await;
        let data = self.store.scan(shard).await?;
        Ok(Snapshot {
            data,
            logs: wal.entries().to_vec(),
            commit_index: wal.applied(),
        })
    }

    // ============================================================
    // DATA PATH
    // ============================================================

    /// Waits out a catch-up in progress on the shard, like mutations do.
    pub async fn read(&self, request: &ReadRequest) -> Result<Vec<StudentRecord>> {
        let log = self.log_of(&request.shard)?;
        let _wal = log.lock().await;
        let rows = self
            .store
            .query_range(&request.shard, request.range.low, request.range.high)
            .await?;
        Ok(rows)
    }

    /// Write path: append, fan out if primary, replay.
    ///
    /// A mutation whose sequence was already appended is acknowledged without
    /// being appended or forwarded again.
    pub async fn mutate(
        &self,
        mutation: Mutation,
        sequence: Option<Sequence>,
    ) -> Result<MessageResponse> {
        let shard = mutation.shard().to_string();
        let log = self.log_of(&shard)?;

        let index = {
            let mut wal = log.lock().await;
            if wal.is_duplicate(sequence) {
                tracing::debug!(
                    "{}: duplicate {} for shard {} (sequence {:?}), ignoring",
                    self.name,
                    mutation.endpoint(),
                    shard,
                    sequence
                );
                return Ok(mutation.acknowledgement());
            }
            wal.append(LogEntry::new(sequence, mutation.operation()))
                .await?
        };

        let secondaries = {
            let primaries = self.primaries.read().await;
            if primaries.is_primary(&shard, &self.name) {
                primaries.secondaries(&shard)
            } else {
                Vec::new()
            }
        };
        self.forward(&mutation, sequence, &secondaries).await?;

        let mut wal = log.lock().await;
        wal.replay(self.store.as_ref()).await?;
        match wal.take_rejection(index) {
            Some(e) => Err(e.into()),
            None => Ok(mutation.acknowledgement()),
        }
    }

    /// Sends the mutation to every secondary, retrying transient failures.
    ///
    /// A secondary that stays unreachable is left to the heartbeat repair,
    /// which resyncs it from a snapshot; only shutdown aborts the write.
    async fn forward(
        &self,
        mutation: &Mutation,
        sequence: Option<Sequence>,
        secondaries: &[String],
    ) -> Result<()> {
        for secondary in secondaries {
            let what = format!("forward {} to {}", mutation.endpoint(), secondary);
            let outcome = self
                .retry
                .run(&what, &self.shutdown, |_| {
                    self.peers.mutate(secondary, mutation, sequence)
                })
                .await;

            match outcome {
                Ok(_) => {}
                Err(ClusterError::Cancelled) => return Err(ClusterError::Cancelled),
                Err(e) => {
                    tracing::error!("{}: {} failed: {}", self.name, what, e);
                }
            }
        }
        Ok(())
    }

    /// Every hosted shard's rows, after replaying anything pending.
    pub async fn dump_all(&self) -> Result<ShardDump> {
        let mut dump = ShardDump::new();
        for shard in self.hosted_shards() {
            let log = self.log_of(&shard)?;
            let mut wal = log.lock().await;
            wal.replay(self.store.as_ref()).await?;
            dump.insert(shard.clone(), self.store.scan(&shard).await?);
        }
        Ok(dump)
    }
}
