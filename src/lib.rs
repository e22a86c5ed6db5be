// ============================================================================
// countd Library
// ============================================================================

//! A distributed per-tenant item counter.
//!
//! A coordinator keeps a pool of worker processes alive and relays client requests to
//! them. Each worker buffers submitted items in memory, merges them into per-tenant JSON
//! files on a timer, and answers count queries from a short-lived cache.
//!
//! ```
//! use countd::{ConfigSnapshot, Item};
//!
//! # fn main() -> countd::Result<()> {
//! let config = ConfigSnapshot::from_yaml_str(
//!     "workers: [\"http://localhost:5001\"]\n\
//!      database: ./db\n\
//!      worker_logs: ./logs\n\
//!      worker_persist: 2\n\
//!      config_check: 5\n",
//! )?;
//! assert_eq!(config.workers.len(), 1);
//!
//! Item::new("42", "tenant-a").validate()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod core;
pub mod storage;
pub mod web;
pub mod worker;

pub use config::{ConfigSnapshot, ConfigSource, FileConfigSource, StaticConfigSource};
pub use coordinator::{
    Coordinator, ForwardPolicy, HttpWorkerClient, InMemoryWorkerClient, LocalProcessSupervisor,
};
pub use crate::core::{CountError, CountResponse, Item, Result, SubmitResponse};
pub use storage::{DurableTenantStore, TenantItemBuffer};
pub use worker::Worker;
