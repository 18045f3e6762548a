//! # Storage Module
//!
//! Persistent backends. The volatile store lives in `graph`.

mod redb_store;

pub use redb_store::RedbStore;
