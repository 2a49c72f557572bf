//! # chatsync-store
//!
//! Local persistence for the chat widget's read-state.
//!
//! The engine persists three string entries per conversation. This crate
//! provides the flat [`KeyValueStore`] contract, a SQLite-backed
//! [`Database`] that survives restarts, an in-process [`MemoryStore`], and
//! the typed [`ReadStateStore`] the engine talks to.

pub mod database;
pub mod kv;
pub mod migrations;
pub mod read_state;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use kv::{KeyValueStore, MemoryStore};
pub use read_state::{ReadState, ReadStateStore};
