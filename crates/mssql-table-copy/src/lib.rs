//! # mssql-table-copy
//!
//! Paged table copy between two SQL Server databases.
//!
//! This library replicates tables (schema, indexes and rows) from a source
//! schema to a target schema, and can instead report the differences
//! between the two:
//!
//! - **DDL synthesis** from reflected catalog metadata
//! - **Keyset or offset paging** chosen per table from its primary key
//! - **Per-page transactions** with identity insert and decimal binding
//! - **Resumable runs** via an append-only progress log
//! - **Comparison** of columns, index column sets, row counts and view definitions
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_table_copy::{Config, Replicator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let mut replicator = Replicator::connect(&config).await?;
//!     let summary = replicator.run().await?;
//!     println!("Copied {} rows", summary.rows_copied);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod exec;
pub mod indexes;
pub mod orchestrator;
pub mod schema;
pub mod session;
pub mod state;
pub mod transfer;
pub mod verify;
pub mod views;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{AuthMethod, Config, ConnectionConfig, JobConfig};
pub use error::{CopyError, Result};
pub use orchestrator::{connect_side, list_tables, Replicator, RunSummary, Side};
pub use session::{MssqlSession, Session};
pub use state::{ProgressTracker, Tracked};
pub use transfer::{CopyEngine, CopyStats};
pub use verify::{ComparisonFinding, FindingCategory, ObjectComparison};
