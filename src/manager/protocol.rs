use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::membership::{ServerShards, ShardSpec};

pub const ENDPOINT_INIT: &str = "/init";
pub const ENDPOINT_ADD: &str = "/add";
pub const ENDPOINT_RM: &str = "/rm";
pub const ENDPOINT_PSINFO: &str = "/psinfo";

/// Initial layout: shard definitions and the shards each server hosts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitRequest {
    #[serde(rename = "N", alias = "n", default, skip_serializing_if = "Option::is_none")]
    pub n: Option<usize>,
    pub shards: Vec<ShardSpec>,
    pub servers: ServerShards,
}

/// New shards and/or servers. `servers` may reference existing shards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddRequest {
    #[serde(alias = "N", default, skip_serializing_if = "Option::is_none")]
    pub n: Option<usize>,
    #[serde(default)]
    pub new_shards: Vec<ShardSpec>,
    pub servers: ServerShards,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoveRequest {
    #[serde(alias = "N", default)]
    pub n: usize,
    #[serde(default)]
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagerResponse {
    pub message: String,
    pub status: String,
    /// Base URL of every server the manager provisioned.
    #[serde(default)]
    pub addresses: BTreeMap<String, String>,
}

impl ManagerResponse {
    pub fn success(message: impl Into<String>, addresses: BTreeMap<String, String>) -> Self {
        Self {
            message: message.into(),
            status: "success".to_string(),
            addresses,
        }
    }
}
