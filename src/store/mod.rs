//! Storage Collaborator
//!
//! The row-level storage engine every replica writes into. The replication
//! layer only depends on the table-scoped CRUD contract in [`TableStore`];
//! [`MemoryTableStore`] is the bundled engine, one ordered table per shard.
//!
//! ## Contract
//! - **migrate**: create the table for a shard if it does not exist.
//! - **insert**: add rows; a duplicate primary key fails the whole batch.
//! - **query_range**: rows with `low <= Stud_id < high`, ordered by id.
//! - **update_where / delete_where**: conditional by record id.

pub mod memory;
pub mod table;
pub mod types;

pub use memory::MemoryTableStore;
pub use table::TableStore;
pub use types::{RecordId, StoreError, StudentRecord};
