use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::table::TableStore;
use super::types::{RecordId, StoreError, StudentRecord};

/// In-memory storage engine.
///
/// Structure: `Table name -> Stud_id -> row`. The outer `DashMap` shards
/// locking per table; each table is an ordered map so range queries are a
/// plain `BTreeMap::range`.
#[derive(Clone, Default)]
pub struct MemoryTableStore {
    tables: Arc<DashMap<String, BTreeMap<RecordId, StudentRecord>>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(|rows| rows.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn migrate(&self, table: &str) -> Result<(), StoreError> {
        self.tables.entry(table.to_string()).or_default();
        Ok(())
    }

    async fn insert(&self, table: &str, rows: &[StudentRecord]) -> Result<(), StoreError> {
        let mut entries = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::MissingTable(table.to_string()))?;

        let mut batch = BTreeMap::new();
        for row in rows {
            if entries.contains_key(&row.stud_id) || batch.contains_key(&row.stud_id) {
                return Err(StoreError::DuplicateKey(row.stud_id));
            }
            batch.insert(row.stud_id, row.clone());
        }
        entries.append(&mut batch);
        Ok(())
    }

    async fn query_range(
        &self,
        table: &str,
        low: RecordId,
        high: RecordId,
    ) -> Result<Vec<StudentRecord>, StoreError> {
        let entries = self
            .tables
            .get(table)
            .ok_or_else(|| StoreError::MissingTable(table.to_string()))?;
        if low >= high {
            return Ok(Vec::new());
        }
        Ok(entries.range(low..high).map(|(_, row)| row.clone()).collect())
    }

    async fn update_where(
        &self,
        table: &str,
        stud_id: RecordId,
        row: &StudentRecord,
    ) -> Result<usize, StoreError> {
        let mut entries = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::MissingTable(table.to_string()))?;

        if !entries.contains_key(&stud_id) {
            return Ok(0);
        }
        if row.stud_id != stud_id && entries.contains_key(&row.stud_id) {
            return Err(StoreError::DuplicateKey(row.stud_id));
        }
        entries.remove(&stud_id);
        entries.insert(row.stud_id, row.clone());
        Ok(1)
    }

    async fn delete_where(&self, table: &str, stud_id: RecordId) -> Result<usize, StoreError> {
        let mut entries = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::MissingTable(table.to_string()))?;
        Ok(entries.remove(&stud_id).map(|_| 1).unwrap_or(0))
    }

    async fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        self.tables.remove(table);
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }

    async fn scan(&self, table: &str) -> Result<Vec<StudentRecord>, StoreError> {
        let entries = self
            .tables
            .get(table)
            .ok_or_else(|| StoreError::MissingTable(table.to_string()))?;
        Ok(entries.values().cloned().collect())
    }
}
