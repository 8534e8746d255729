use serde::{Deserialize, Serialize};

use crate::membership::{ServerShards, ShardSpec};
use crate::replica::protocol::KeyRange;
use crate::store::{RecordId, StudentRecord};

pub const ENDPOINT_INIT: &str = "/init";
pub const ENDPOINT_STATUS: &str = "/status";
pub const ENDPOINT_ADD: &str = "/add";
pub const ENDPOINT_RM: &str = "/rm";
pub const ENDPOINT_READ: &str = "/read";
pub const ENDPOINT_WRITE: &str = "/write";
pub const ENDPOINT_UPDATE: &str = "/update";
pub const ENDPOINT_DELETE: &str = "/del";
pub const ENDPOINT_READ_SERVER: &str = "/read/:server_id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadQuery {
    #[serde(rename = "Stud_id", alias = "stud_id")]
    pub range: KeyRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteQuery {
    pub data: Vec<StudentRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateQuery {
    #[serde(rename = "Stud_id", alias = "stud_id")]
    pub stud_id: RecordId,
    pub data: StudentRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteQuery {
    #[serde(rename = "Stud_id", alias = "stud_id")]
    pub stud_id: RecordId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResult {
    pub shards_queried: Vec<String>,
    pub data: Vec<StudentRecord>,
    /// `"success"`, or the ids of the shards that failed followed by `failed`.
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "N")]
    pub n: usize,
    pub shards: Vec<ShardSpec>,
    pub servers: ServerShards,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddResponse {
    #[serde(rename = "N")]
    pub n: usize,
    pub message: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    #[serde(rename = "N")]
    pub n: usize,
    pub servers: Vec<String>,
    pub status: String,
}
