use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::membership::ShardSpec;
use crate::ring::HashRing;
use crate::wal::Sequence;

/// The balancer's record of one shard. The key range never changes; the
/// replica set, ring and request counter sit behind the shard's lock.
pub struct ShardMetadata {
    pub spec: ShardSpec,
    pub state: Arc<RwLock<ShardState>>,
}

impl ShardMetadata {
    pub fn new(spec: ShardSpec) -> Self {
        Self {
            spec,
            state: Arc::new(RwLock::new(ShardState::default())),
        }
    }
}

#[derive(Debug, Default)]
pub struct ShardState {
    pub replicas: BTreeSet<String>,
    pub ring: HashRing,
    /// Last sequence number handed to the shard's primary.
    pub sequence: Sequence,
}

impl ShardState {
    /// Returns false if `server` already was a replica.
    pub fn add_replica(&mut self, server: &str) -> bool {
        if !self.replicas.insert(server.to_string()) {
            return false;
        }
        self.ring.insert(server);
        true
    }

    pub fn remove_replica(&mut self, server: &str) -> bool {
        if !self.replicas.remove(server) {
            return false;
        }
        self.ring.remove(server);
        true
    }

    /// Sequence for the next mutation. A client-supplied value is used as is
    /// and the counter never moves backwards.
    pub fn next_sequence(&mut self, requested: Option<Sequence>) -> Sequence {
        match requested {
            Some(sequence) => {
                self.sequence = self.sequence.max(sequence);
                sequence
            }
            None => {
                self.sequence += 1;
                self.sequence
            }
        }
    }
}
