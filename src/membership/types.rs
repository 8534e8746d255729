use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::store::RecordId;

/// Server name → shard ids it hosts, as carried by `/init` and `/add`.
pub type ServerShards = BTreeMap<String, Vec<String>>;

/// Definition of one shard: the half-open key range
/// `[Stud_id_low, Stud_id_low + Shard_size)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardSpec {
    #[serde(rename = "Stud_id_low", alias = "stud_id_low")]
    pub key_low: RecordId,
    #[serde(rename = "Shard_id", alias = "shard_id")]
    pub id: String,
    #[serde(rename = "Shard_size", alias = "shard_size")]
    pub size: i64,
}

impl ShardSpec {
    pub fn new(id: impl Into<String>, key_low: RecordId, size: i64) -> Self {
        Self {
            key_low,
            id: id.into(),
            size,
        }
    }

    pub fn key_high(&self) -> RecordId {
        self.key_low.saturating_add(self.size)
    }

    pub fn contains(&self, key: RecordId) -> bool {
        self.key_low <= key && key < self.key_high()
    }

    /// The part of `[low, high)` this shard is responsible for, if any.
    pub fn intersect(&self, low: RecordId, high: RecordId) -> Option<(RecordId, RecordId)> {
        if low >= self.key_high() || high <= self.key_low {
            return None;
        }
        Some((low.max(self.key_low), high.min(self.key_high())))
    }
}

/// Replica membership of every shard: shard id → server → is-primary.
///
/// Ordered maps keep iteration (and therefore election tie-breaks and
/// broadcasts) deterministic. Serialises as `{shard: {server: bool}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimaryMap(BTreeMap<String, BTreeMap<String, bool>>);

impl PrimaryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn shards(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn has_shard(&self, shard: &str) -> bool {
        self.0.contains_key(shard)
    }

    pub fn primary_of(&self, shard: &str) -> Option<&str> {
        self.0
            .get(shard)?
            .iter()
            .find(|(_, primary)| **primary)
            .map(|(server, _)| server.as_str())
    }

    pub fn is_primary(&self, shard: &str, server: &str) -> bool {
        self.primary_of(shard) == Some(server)
    }

    pub fn contains(&self, shard: &str, server: &str) -> bool {
        self.0
            .get(shard)
            .is_some_and(|members| members.contains_key(server))
    }

    /// Every member of `shard`, in server-id order.
    pub fn members(&self, shard: &str) -> Vec<String> {
        self.0
            .get(shard)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn secondaries(&self, shard: &str) -> Vec<String> {
        self.0
            .get(shard)
            .map(|members| {
                members
                    .iter()
                    .filter(|(_, primary)| !**primary)
                    .map(|(server, _)| server.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn shards_of(&self, server: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, members)| members.contains_key(server))
            .map(|(shard, _)| shard.clone())
            .collect()
    }

    /// Shards `server` is currently primary for.
    pub fn primary_shards_of(&self, server: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, members)| members.get(server).copied().unwrap_or(false))
            .map(|(shard, _)| shard.clone())
            .collect()
    }

    pub fn servers(&self) -> BTreeSet<String> {
        self.0
            .values()
            .flat_map(|members| members.keys().cloned())
            .collect()
    }

    /// Registers a shard with no members yet.
    pub fn add_shard(&mut self, shard: &str) {
        self.0.entry(shard.to_string()).or_default();
    }

    /// Adds `server` to `shard` as a secondary. An existing membership keeps
    /// its primary flag.
    pub fn add_member(&mut self, shard: &str, server: &str) {
        self.0
            .entry(shard.to_string())
            .or_default()
            .entry(server.to_string())
            .or_insert(false);
    }

    /// Marks every member of `shard` non-primary, then `server` primary.
    /// Returns false (and changes nothing) if `server` is not a member.
    pub fn set_primary(&mut self, shard: &str, server: &str) -> bool {
        let Some(members) = self.0.get_mut(shard) else {
            return false;
        };
        if !members.contains_key(server) {
            return false;
        }
        for (member, primary) in members.iter_mut() {
            *primary = member == server;
        }
        true
    }

    pub fn clear_primary(&mut self, shard: &str) {
        if let Some(members) = self.0.get_mut(shard) {
            members.values_mut().for_each(|primary| *primary = false);
        }
    }

    /// Drops `server` from every shard. Returns the shards it was primary for.
    pub fn remove_server(&mut self, server: &str) -> Vec<String> {
        let mut orphaned = Vec::new();
        for (shard, members) in self.0.iter_mut() {
            if members.remove(server) == Some(true) {
                orphaned.push(shard.clone());
            }
        }
        orphaned
    }

    /// Shards that currently have members but no primary.
    pub fn shards_without_primary(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, members)| !members.is_empty() && !members.values().any(|p| *p))
            .map(|(shard, _)| shard.clone())
            .collect()
    }
}
