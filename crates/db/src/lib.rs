//! `db` crate: pure persistence layer.
//!
//! Provides a connection pool, the automation run row, repository functions
//! for the `automation_runs` table and the [`RunStore`] seam the engine
//! writes through.  No business logic lives here.

pub mod error;
pub mod models;
pub mod pool;
pub mod registry;
pub mod repository;
pub mod store;

pub use pool::{DbPool, PoolConfig};
pub use error::DbError;
pub use models::{RunRecord, RunStatus};
pub use registry::{MemoryRepository, Repository};
pub use store::{MemoryRunStore, PgRunStore, RunStore};
