use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::membership::PrimaryMap;
use crate::store::{RecordId, StudentRecord};
use crate::wal::{LogEntry, Operation};

pub const ENDPOINT_HEARTBEAT: &str = "/heartbeat";
pub const ENDPOINT_CONFIG: &str = "/config";
pub const ENDPOINT_ADD_SHARD: &str = "/add";
pub const ENDPOINT_COPY: &str = "/copy";
pub const ENDPOINT_LENLOG: &str = "/lenlog";
pub const ENDPOINT_READ: &str = "/read";
pub const ENDPOINT_WRITE: &str = "/write";
pub const ENDPOINT_UPDATE: &str = "/update";
pub const ENDPOINT_DELETE: &str = "/del";
pub const ENDPOINT_UPDATE_PSINFO: &str = "/updatepsinfo";
pub const ENDPOINT_GETALL: &str = "/getall";

/// Generic `{message, status}` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
    pub status: String,
}

impl MessageResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: "success".to_string(),
        }
    }
}

/// Shards to host, sent once by the shard manager after (re)starting a
/// replica.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigRequest {
    pub shards: Vec<String>,
    #[serde(default)]
    pub map_data: PrimaryMap,
    #[serde(default)]
    pub addresses: BTreeMap<String, String>,
}

/// Membership broadcast from the shard manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrimaryUpdate {
    pub map_data: PrimaryMap,
    #[serde(default)]
    pub addresses: BTreeMap<String, String>,
}

/// Body of `/copy`, `/lenlog` and `/add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardRequest {
    #[serde(alias = "Shard")]
    pub shard: String,
}

/// Everything a catching-up replica needs: current rows, the whole log and
/// how many log entries those rows already reflect.
///
/// Over HTTP the commit index travels in the `Commit-Index` header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "Data")]
    pub data: Vec<StudentRecord>,
    #[serde(rename = "Logs")]
    pub logs: Vec<LogEntry>,
    #[serde(skip)]
    pub commit_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLength {
    #[serde(rename = "Length")]
    pub length: usize,
}

/// Half-open key range `[low, high)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyRange {
    pub low: RecordId,
    pub high: RecordId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRequest {
    pub shard: String,
    #[serde(rename = "Stud_id")]
    pub range: KeyRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    pub data: Vec<StudentRecord>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteRequest {
    pub shard: String,
    pub data: Vec<StudentRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateRequest {
    pub shard: String,
    #[serde(rename = "Stud_id")]
    pub stud_id: RecordId,
    pub data: StudentRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteRequest {
    pub shard: String,
    #[serde(rename = "Stud_id")]
    pub stud_id: RecordId,
}

/// A mutation addressed to one shard, as received by a replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Write(WriteRequest),
    Update(UpdateRequest),
    Delete(DeleteRequest),
}

impl Mutation {
    pub fn shard(&self) -> &str {
        match self {
            Mutation::Write(req) => &req.shard,
            Mutation::Update(req) => &req.shard,
            Mutation::Delete(req) => &req.shard,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Mutation::Write(req) => Operation::Insert {
                rows: req.data.clone(),
            },
            Mutation::Update(req) => Operation::Update {
                stud_id: req.stud_id,
                row: req.data.clone(),
            },
            Mutation::Delete(req) => Operation::Delete {
                stud_id: req.stud_id,
            },
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            Mutation::Write(_) => ENDPOINT_WRITE,
            Mutation::Update(_) => ENDPOINT_UPDATE,
            Mutation::Delete(_) => ENDPOINT_DELETE,
        }
    }

    pub fn method(&self) -> reqwest::Method {
        match self {
            Mutation::Write(_) => reqwest::Method::POST,
            Mutation::Update(_) => reqwest::Method::PUT,
            Mutation::Delete(_) => reqwest::Method::DELETE,
        }
    }

    pub fn body(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Mutation::Write(req) => serde_json::to_value(req),
            Mutation::Update(req) => serde_json::to_value(req),
            Mutation::Delete(req) => serde_json::to_value(req),
        }
    }

    pub fn acknowledgement(&self) -> MessageResponse {
        match self {
            Mutation::Write(_) => MessageResponse::success("Data entries added"),
            Mutation::Update(req) => {
                MessageResponse::success(format!("Data entry for Stud_id:{} updated", req.stud_id))
            }
            Mutation::Delete(req) => {
                MessageResponse::success(format!("Data entry with Stud_id:{} removed", req.stud_id))
            }
        }
    }
}

/// `/getall`: shard id → every row of that shard.
pub type ShardDump = BTreeMap<String, Vec<StudentRecord>>;
