//! # abyss-node: curse service composition, storage and timers.
//!
//! Composes the curse engine into a running service:
//! - [`storage::RocksStore`]: persistent curse state backed by RocksDB
//! - [`store::EntityStore`]: tracked entities, one mutex each
//! - [`node::Node`]: lifecycle events, timer loops, autosave and administration
//! - [`config::NodeConfig`]: node configuration

pub mod config;
pub mod node;
pub mod storage;
pub mod store;

pub use config::NodeConfig;
pub use node::{EntityReport, Node};
pub use storage::{MemoryStore, RocksStore};
pub use store::EntityStore;
