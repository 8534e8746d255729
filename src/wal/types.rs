use serde::{Deserialize, Serialize};

use crate::store::{RecordId, StoreError, StudentRecord, TableStore};

/// Per-shard write sequence number assigned by the load balancer.
pub type Sequence = u64;

/// A mutation as recorded in the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Insert {
        rows: Vec<StudentRecord>,
    },
    Update {
        stud_id: RecordId,
        row: StudentRecord,
    },
    Delete {
        stud_id: RecordId,
    },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "insert",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
        }
    }

    /// Applies the operation to the shard's table.
    pub async fn apply(&self, store: &dyn TableStore, table: &str) -> Result<(), StoreError> {
        match self {
            Operation::Insert { rows } => store.insert(table, rows).await,
            Operation::Update { stud_id, row } => {
                store.update_where(table, *stud_id, row).await.map(|_| ())
            }
            Operation::Delete { stud_id } => store.delete_where(table, *stud_id).await.map(|_| ()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    /// `None` for mutations that arrived without a `Request-Count`.
    #[serde(default)]
    pub sequence: Option<Sequence>,
    pub operation: Operation,
}

impl LogEntry {
    pub fn new(sequence: Option<Sequence>, operation: Operation) -> Self {
        Self {
            sequence,
            operation,
        }
    }
}
