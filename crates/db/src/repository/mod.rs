//! SQL for the `automation_runs` table, one function per statement.
//!
//! Queries are built at runtime so the crate compiles without a live
//! database; `PgRunStore` is the only caller.

pub mod runs;
