//! Ad-hoc statement execution against either side.

use std::time::{Duration, Instant};

use tracing::info;

use crate::core::{ResultSet, Statement};
use crate::error::{CopyError, Result};
use crate::session::Session;

/// What a statement returned.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutput {
    Rows(ResultSet),
    Affected(u64),
}

/// Outcome of one executed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecResult {
    pub sql: String,
    pub output: ExecOutput,
    pub execution_time: Duration,
}

impl ExecResult {
    /// Console lines: one ` | `-joined line per row plus a timing footer.
    pub fn render(&self) -> Vec<String> {
        let ms = self.execution_time.as_secs_f64() * 1000.0;
        match &self.output {
            ExecOutput::Rows(rs) => {
                let mut lines = Vec::with_capacity(rs.len() + 2);
                if !rs.columns.is_empty() {
                    lines.push(rs.columns.join(" | "));
                }
                lines.extend(rs.rows.iter().map(|row| {
                    row.iter()
                        .map(|v| v.display())
                        .collect::<Vec<_>>()
                        .join(" | ")
                }));
                lines.push(format!("({} rows, {:.1} ms)", rs.len(), ms));
                lines
            }
            ExecOutput::Affected(n) => vec![format!("({} rows affected, {:.1} ms)", n, ms)],
        }
    }
}

/// Statements that produce a result set.
fn returns_rows(sql: &str) -> bool {
    let first = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    first == "SELECT" || first == "WITH"
}

/// Run statements in order, stopping at the first failure.
pub async fn run_statements(
    session: &mut dyn Session,
    statements: &[String],
) -> Result<Vec<ExecResult>> {
    let mut results = Vec::with_capacity(statements.len());
    for (i, sql) in statements.iter().enumerate() {
        let sql = sql.trim();
        if sql.is_empty() {
            continue;
        }
        let stmt = Statement::new(sql);
        let start = Instant::now();
        let output = if returns_rows(sql) {
            session.query(&stmt).await.map(ExecOutput::Rows)
        } else {
            session.execute(&stmt).await.map(ExecOutput::Affected)
        };
        let output = output.map_err(|e| {
            CopyError::execution(format!("statement {} on {}", i + 1, session.name()), e)
        })?;
        let result = ExecResult {
            sql: sql.to_string(),
            output,
            execution_time: start.elapsed(),
        };
        info!(
            "Statement {} on {} finished in {:?}",
            i + 1,
            session.name(),
            result.execution_time
        );
        results.push(result);
    }
    Ok(results)
}
