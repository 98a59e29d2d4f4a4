//! Paged row copy from source to target.
//!
//! The engine runs strictly sequentially: fetch a page, write it inside one
//! target transaction, commit, move on. An empty page ends the copy.

mod binding;
mod paging;

pub use binding::DecimalBinding;
pub use paging::{
    count_query, select_strategy, PageCursor, PagingStrategy, RowFilter, SOURCE_ALIAS,
};

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::JobConfig;
use crate::core::{qualify, quote_list, Row, SqlValue, Statement};
use crate::error::{CopyError, Result};
use crate::schema::TableDescriptor;
use crate::session::Session;

/// SQL Server accepts 2100 RPC parameters; `sp_executesql` takes two of them
/// for the statement text and the parameter declarations.
const MAX_PARAMS_PER_STATEMENT: usize = 2098;

/// SQL Server's row limit for a `VALUES` list.
const MAX_ROWS_PER_STATEMENT: usize = 1000;

/// Outcome of one table copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyStats {
    /// Rows fetched (and written, unless dry run).
    pub rows: u64,
    /// Non-empty pages processed.
    pub pages: u64,
    pub elapsed: Duration,
}

impl CopyStats {
    pub fn rows_per_sec(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.rows as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Copy engine configuration.
#[derive(Debug, Clone)]
pub struct CopyEngine {
    /// Rows per page.
    pub page_size: usize,
    /// 1-based page to start from.
    pub page_start: usize,
    /// Fetch and log only.
    pub dry_run: bool,
}

impl Default for CopyEngine {
    fn default() -> Self {
        Self {
            page_size: 50_000,
            page_start: 1,
            dry_run: false,
        }
    }
}

impl CopyEngine {
    pub fn from_job(job: &JobConfig) -> Self {
        Self {
            page_size: job.page_size,
            page_start: job.page_start,
            dry_run: job.dry_run,
        }
    }

    /// Copy `table` from the source into `target_schema` on the target.
    ///
    /// Identity insert is switched on for the whole copy when the table has
    /// an identity column, and always switched off again afterwards. When
    /// both the copy and the switch-off fail, the copy error is returned.
    pub async fn copy(
        &self,
        source: &mut dyn Session,
        target: &mut dyn Session,
        table: &TableDescriptor,
        target_schema: &str,
        filter: &RowFilter,
    ) -> Result<CopyStats> {
        let target_table = qualify(target_schema, &table.name)?;
        let identity = table.has_identity() && !self.dry_run;

        match source.query(&count_query(table, filter)?).await {
            Ok(rs) => {
                let total = rs.scalar().and_then(SqlValue::as_i64).unwrap_or(0);
                info!(
                    "{}: {} rows to copy (page size {}, starting at page {})",
                    table.full_name(),
                    total,
                    self.page_size,
                    self.page_start
                );
            }
            Err(e) => warn!("{}: row count unavailable: {}", table.full_name(), e),
        }

        if identity {
            let on = format!("SET IDENTITY_INSERT {} ON", target_table);
            target
                .execute(&Statement::new(on))
                .await
                .map_err(|e| CopyError::execution(format!("identity insert {}", target_table), e))?;
        }

        let result = self
            .copy_pages(source, target, table, &target_table, filter)
            .await;

        if identity {
            let off = format!("SET IDENTITY_INSERT {} OFF", target_table);
            let off = target.execute(&Statement::new(off)).await;
            if let Err(e) = off {
                if result.is_ok() {
                    return Err(CopyError::execution(
                        format!("identity insert off {}", target_table),
                        e,
                    ));
                }
                warn!("{}: failed to reset IDENTITY_INSERT: {}", target_table, e);
            }
        }

        result
    }

    async fn copy_pages(
        &self,
        source: &mut dyn Session,
        target: &mut dyn Session,
        table: &TableDescriptor,
        target_table: &str,
        filter: &RowFilter,
    ) -> Result<CopyStats> {
        let start = Instant::now();
        let columns = table.column_names();
        let binding = DecimalBinding::for_table(table);
        let mut cursor = PageCursor::new(table, filter, self.page_size, self.page_start);
        let mut stats = CopyStats::default();

        loop {
            let stmt = cursor.page_query()?;
            let page_started = Instant::now();
            let mut rows = source.query(&stmt).await.map_err(|e| {
                CopyError::execution(
                    format!("fetch page {} of {}", cursor.page(), table.full_name()),
                    e,
                )
            })?;
            let fetch_time = page_started.elapsed();

            if rows.is_empty() {
                debug!(
                    "{}: page {} empty at offset {}",
                    table.full_name(),
                    cursor.page(),
                    cursor.offset()
                );
                break;
            }

            let fetched = rows.len() as u64;
            let write_started = Instant::now();
            if !self.dry_run {
                binding.apply_all(&mut rows.rows);
                write_page(target, target_table, &columns, &rows.rows)
                    .await
                    .map_err(|e| {
                        CopyError::execution(
                            format!("write page {} into {}", cursor.page(), target_table),
                            e,
                        )
                    })?;
            }

            stats.rows += fetched;
            stats.pages += 1;
            info!(
                "{}: page {} ({} rows from offset {}) read in {:?}, written in {:?}{}",
                table.full_name(),
                cursor.page(),
                fetched,
                cursor.offset(),
                fetch_time,
                write_started.elapsed(),
                if self.dry_run { " [dry run]" } else { "" }
            );

            cursor.advance();
        }

        stats.elapsed = start.elapsed();
        info!(
            "{}: copied {} rows in {} pages in {:?} ({} rows/sec)",
            table.full_name(),
            stats.rows,
            stats.pages,
            stats.elapsed,
            stats.rows_per_sec()
        );
        Ok(stats)
    }
}

/// Insert one page inside a transaction, rolling back on failure.
async fn write_page(
    target: &mut dyn Session,
    target_table: &str,
    columns: &[String],
    rows: &[Row],
) -> Result<u64> {
    target
        .execute(&Statement::new("BEGIN TRANSACTION"))
        .await?;

    match insert_rows(target, target_table, columns, rows).await {
        Ok(inserted) => {
            target
                .execute(&Statement::new("COMMIT TRANSACTION"))
                .await?;
            Ok(inserted)
        }
        Err(e) => {
            if let Err(rollback) = target
                .execute(&Statement::new("ROLLBACK TRANSACTION"))
                .await
            {
                warn!("{}: rollback failed: {}", target_table, rollback);
            }
            Err(e)
        }
    }
}

/// Rows per multi-row INSERT for a column count.
pub(crate) fn rows_per_statement(column_count: usize) -> usize {
    (MAX_PARAMS_PER_STATEMENT / column_count.max(1)).clamp(1, MAX_ROWS_PER_STATEMENT)
}

/// Parameterized multi-row INSERTs with an explicit column list.
async fn insert_rows(
    target: &mut dyn Session,
    target_table: &str,
    columns: &[String],
    rows: &[Row],
) -> Result<u64> {
    if columns.is_empty() {
        return Err(CopyError::execution(
            target_table,
            "cannot insert with zero columns",
        ));
    }

    let col_str = quote_list(columns)?;
    let cols_per_row = columns.len();
    let mut total_inserted = 0u64;

    for batch in rows.chunks(rows_per_statement(cols_per_row)) {
        let mut value_groups = Vec::with_capacity(batch.len());
        let mut param_idx = 1;
        for _ in batch {
            let placeholders: Vec<String> = (0..cols_per_row)
                .map(|_| {
                    let p = format!("@P{}", param_idx);
                    param_idx += 1;
                    p
                })
                .collect();
            value_groups.push(format!("({})", placeholders.join(", ")));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            target_table,
            col_str,
            value_groups.join(", ")
        );
        let params = batch.iter().flat_map(|row| row.iter().cloned()).collect();

        target.execute(&Statement::with_params(sql, params)).await?;
        total_inserted += batch.len() as u64;
    }

    Ok(total_inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_table, FakeServer};

    fn engine(page_size: usize) -> CopyEngine {
        CopyEngine {
            page_size,
            page_start: 1,
            dry_run: false,
        }
    }

    #[test]
    fn test_rows_per_statement() {
        assert_eq!(rows_per_statement(1), 1000);
        assert_eq!(rows_per_statement(3), 699);
        assert_eq!(rows_per_statement(5000), 1);
    }

    #[test]
    fn test_rows_per_statement_leaves_rpc_headroom() {
        for cols in [2, 3, 4, 5, 6, 7, 10, 12, 14, 15, 20, 21, 100, 2098, 2100] {
            let rows = rows_per_statement(cols);
            assert!(
                cols > MAX_PARAMS_PER_STATEMENT || rows * cols <= 2098,
                "{} columns x {} rows binds too many parameters",
                cols,
                rows
            );
        }
        assert_eq!(rows_per_statement(4), 524);
        assert_eq!(rows_per_statement(10), 209);
    }

    #[tokio::test]
    async fn test_keyset_windows_for_250k_rows() {
        let table = sample_table("dbo", "T");
        let mut source = FakeServer::new("source").with_table(table.clone(), 250_000);
        let mut target = FakeServer::new("target");
        let log = source.log();
        let engine = CopyEngine {
            dry_run: true,
            ..engine(100_000)
        };

        let stats = engine
            .copy(&mut source, &mut target, &table, "target", &RowFilter::default())
            .await
            .unwrap();

        assert_eq!(stats.rows, 250_000);
        assert_eq!(stats.pages, 3);
        let windows: Vec<Vec<SqlValue>> = log
            .queries_containing("__copy_rank")
            .into_iter()
            .map(|s| s.params)
            .collect();
        assert_eq!(
            windows,
            vec![
                vec![SqlValue::I64(0), SqlValue::I64(100_000)],
                vec![SqlValue::I64(100_000), SqlValue::I64(200_000)],
                vec![SqlValue::I64(200_000), SqlValue::I64(300_000)],
                vec![SqlValue::I64(300_000), SqlValue::I64(400_000)],
            ]
        );
        assert!(target.log().executed().is_empty());
    }

    #[tokio::test]
    async fn test_row_count_failure_does_not_stop_copy() {
        let table = sample_table("dbo", "T");
        let mut source = FakeServer::new("source")
            .with_table(table.clone(), 30)
            .failing_on("COUNT_BIG");
        let mut target = FakeServer::new("target");
        let engine = CopyEngine {
            dry_run: true,
            ..engine(10)
        };

        let stats = engine
            .copy(&mut source, &mut target, &table, "target", &RowFilter::default())
            .await
            .unwrap();

        assert_eq!(stats.rows, 30);
        assert_eq!(stats.pages, 3);
    }

    #[tokio::test]
    async fn test_offset_pages_and_last_partial_page() {
        let mut table = sample_table("dbo", "T");
        table.primary_key = None;
        let mut source = FakeServer::new("source").with_table(table.clone(), 25);
        let mut target = FakeServer::new("target");
        let target_log = target.log();

        let stats = engine(10)
            .copy(&mut source, &mut target, &table, "archive", &RowFilter::default())
            .await
            .unwrap();

        assert_eq!(stats.rows, 25);
        assert_eq!(stats.pages, 3);
        let offsets: Vec<SqlValue> = source
            .log()
            .queries_containing("FETCH NEXT")
            .into_iter()
            .map(|s| s.params[0].clone())
            .collect();
        assert_eq!(
            offsets,
            vec![
                SqlValue::I64(0),
                SqlValue::I64(10),
                SqlValue::I64(20),
                SqlValue::I64(30)
            ]
        );

        let inserts: Vec<(String, usize)> = target_log
            .all()
            .into_iter()
            .filter(|(_, s)| s.sql.starts_with("INSERT"))
            .map(|(_, s)| (s.sql, s.params.len()))
            .collect();
        assert_eq!(inserts.len(), 3);
        assert!(inserts[0].0.starts_with(
            "INSERT INTO [archive].[T] ([id], [name], [amount]) VALUES (@P1, @P2, @P3), "
        ));
        assert_eq!(inserts[0].1, 30);
        assert_eq!(inserts[2].1, 15);
    }

    #[tokio::test]
    async fn test_each_page_is_one_transaction() {
        let table = sample_table("dbo", "T");
        let mut source = FakeServer::new("source").with_table(table.clone(), 4);
        let mut target = FakeServer::new("target");

        engine(2)
            .copy(&mut source, &mut target, &table, "target", &RowFilter::default())
            .await
            .unwrap();

        let executed = target.log().executed();
        let shape: Vec<&str> = executed
            .iter()
            .map(|s| s.split_whitespace().next().unwrap_or(""))
            .collect();
        assert_eq!(
            shape,
            vec!["BEGIN", "INSERT", "COMMIT", "BEGIN", "INSERT", "COMMIT"]
        );
    }

    #[tokio::test]
    async fn test_decimal_binding_applied_to_inserts() {
        let table = sample_table("dbo", "T");
        let mut source = FakeServer::new("source").with_table(table.clone(), 1);
        let mut target = FakeServer::new("target");
        let log = target.log();

        engine(10)
            .copy(&mut source, &mut target, &table, "target", &RowFilter::default())
            .await
            .unwrap();

        let insert = log
            .all()
            .into_iter()
            .find(|(_, s)| s.sql.starts_with("INSERT"))
            .map(|(_, s)| s)
            .unwrap();
        match &insert.params[2] {
            SqlValue::Decimal(d) => assert_eq!(d.to_string(), "0.50"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_identity_insert_released_on_failure() {
        let mut table = sample_table("dbo", "T");
        table.columns[0].is_identity = true;
        let mut source = FakeServer::new("source").with_table(table.clone(), 5);
        let mut target = FakeServer::new("target").failing_on("INSERT INTO");
        let log = target.log();

        let err = engine(10)
            .copy(&mut source, &mut target, &table, "target", &RowFilter::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("write page 1 into [target].[T]"));

        let executed = log.executed();
        assert_eq!(executed.first().unwrap(), "SET IDENTITY_INSERT [target].[T] ON");
        assert!(executed.contains(&"ROLLBACK TRANSACTION".to_string()));
        assert!(!executed.contains(&"COMMIT TRANSACTION".to_string()));
        assert_eq!(executed.last().unwrap(), "SET IDENTITY_INSERT [target].[T] OFF");
    }

    #[tokio::test]
    async fn test_identity_insert_wraps_successful_copy() {
        let mut table = sample_table("dbo", "T");
        table.columns[0].is_identity = true;
        let mut source = FakeServer::new("source").with_table(table.clone(), 3);
        let mut target = FakeServer::new("target");

        engine(10)
            .copy(&mut source, &mut target, &table, "target", &RowFilter::default())
            .await
            .unwrap();

        let executed = target.log().executed();
        assert_eq!(executed.first().unwrap(), "SET IDENTITY_INSERT [target].[T] ON");
        assert_eq!(executed.last().unwrap(), "SET IDENTITY_INSERT [target].[T] OFF");
    }

    #[tokio::test]
    async fn test_dry_run_skips_identity_and_writes() {
        let mut table = sample_table("dbo", "T");
        table.columns[0].is_identity = true;
        let mut source = FakeServer::new("source").with_table(table.clone(), 3);
        let mut target = FakeServer::new("target");
        let engine = CopyEngine {
            dry_run: true,
            ..engine(2)
        };

        let stats = engine
            .copy(&mut source, &mut target, &table, "target", &RowFilter::default())
            .await
            .unwrap();
        assert_eq!(stats.rows, 3);
        assert!(target.log().all().is_empty());
    }

    #[tokio::test]
    async fn test_page_start_skips_leading_pages() {
        let table = sample_table("dbo", "T");
        let mut source = FakeServer::new("source").with_table(table.clone(), 30);
        let mut target = FakeServer::new("target");
        let engine = CopyEngine {
            page_start: 2,
            ..engine(10)
        };

        let stats = engine
            .copy(&mut source, &mut target, &table, "target", &RowFilter::default())
            .await
            .unwrap();
        assert_eq!(stats.rows, 20);
        let first = &source.log().queries_containing("__copy_rank")[0];
        assert_eq!(first.params, vec![SqlValue::I64(10), SqlValue::I64(20)]);
    }
}
