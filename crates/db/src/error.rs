//! Errors raised by run stores.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("run store query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("run record not found")]
    NotFound,

    #[error("run store migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The store refused the write (closed pool, read-only replica, test double).
    #[error("run store unavailable: {0}")]
    Unavailable(String),
}
