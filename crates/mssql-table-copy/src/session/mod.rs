//! Database session abstraction.
//!
//! Every catalog read, page fetch and DDL/DML statement goes through
//! [`Session`], so the copy, index and comparison logic never touches the
//! driver directly.

mod convert;
mod mssql;

pub use mssql::MssqlSession;

use async_trait::async_trait;

use crate::core::{ResultSet, Statement};
use crate::error::Result;

/// A single live connection.
#[async_trait]
pub trait Session: Send {
    /// Label used in logs and error contexts ("source", "target").
    fn name(&self) -> &str;

    /// Run a statement and collect its first result set.
    async fn query(&mut self, stmt: &Statement) -> Result<ResultSet>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&mut self, stmt: &Statement) -> Result<u64>;
}

#[async_trait]
impl<S: Session + ?Sized> Session for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn query(&mut self, stmt: &Statement) -> Result<ResultSet> {
        (**self).query(stmt).await
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64> {
        (**self).execute(stmt).await
    }
}
