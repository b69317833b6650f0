//! Durable item store shared by every pipeline stage.
//!
//! [`ItemStore`] is the only mutable state the stages share. Every mutation
//! is a single read-modify-write of one item, persisted atomically.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

#[cfg(test)]
mod conformance;

pub use error::StoreError;
pub use memory::MemoryItemStore;
pub use sqlite::SqliteItemStore;
pub use store::{InsertOutcome, ItemStore, SharedItemStore};
