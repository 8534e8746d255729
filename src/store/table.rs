use async_trait::async_trait;

use super::types::{RecordId, StoreError, StudentRecord};

/// Table-scoped CRUD contract of the storage engine.
///
/// One table per shard, named after the shard id. Implementations must be
/// safe to share between request handlers.
#[async_trait]
pub trait TableStore: Send + Sync + 'static {
    /// Creates the table if it does not exist yet. Idempotent.
    async fn migrate(&self, table: &str) -> Result<(), StoreError>;

    /// Inserts all rows or none of them.
    async fn insert(&self, table: &str, rows: &[StudentRecord]) -> Result<(), StoreError>;

    /// Rows with `low <= Stud_id < high`, in id order.
    async fn query_range(
        &self,
        table: &str,
        low: RecordId,
        high: RecordId,
    ) -> Result<Vec<StudentRecord>, StoreError>;

    /// Replaces the row with id `stud_id`. Returns the number of rows touched.
    async fn update_where(
        &self,
        table: &str,
        stud_id: RecordId,
        row: &StudentRecord,
    ) -> Result<usize, StoreError>;

    /// Deletes the row with id `stud_id`. Returns the number of rows removed.
    async fn delete_where(&self, table: &str, stud_id: RecordId) -> Result<usize, StoreError>;

    /// Drops the table and all its rows.
    async fn drop_table(&self, table: &str) -> Result<(), StoreError>;

    /// False for engines that lose their rows when the process exits. A
    /// recovered write-ahead log is then replayed from the start.
    fn is_persistent(&self) -> bool {
        true
    }

    /// Every row of the table.
    async fn scan(&self, table: &str) -> Result<Vec<StudentRecord>, StoreError> {
        self.query_range(table, RecordId::MIN, RecordId::MAX).await
    }
}
