use serde::{Deserialize, Serialize};

/// Primary key of a record; shard key ranges are expressed over it.
pub type RecordId = i64;

/// A single row of a shard table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudentRecord {
    #[serde(rename = "Stud_id", alias = "stud_id")]
    pub stud_id: RecordId,
    #[serde(rename = "Stud_name", alias = "stud_name", default)]
    pub stud_name: String,
    #[serde(rename = "Stud_marks", alias = "stud_marks", default)]
    pub stud_marks: i64,
}

impl StudentRecord {
    pub fn new(stud_id: RecordId, stud_name: impl Into<String>, stud_marks: i64) -> Self {
        Self {
            stud_id,
            stud_name: stud_name.into(),
            stud_marks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("table {0} does not exist")]
    MissingTable(String),

    #[error("duplicate entry for Stud_id {0}")]
    DuplicateKey(RecordId),
}
