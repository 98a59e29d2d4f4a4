//! Dropping and recreating non-PK indexes on the target.

use tracing::{debug, info, warn};

use crate::core::{Statement, SqlValue};
use crate::error::{CopyError, Result};
use crate::schema::ddl::{create_index_sql, drop_index_sql};
use crate::schema::TableDescriptor;
use crate::session::Session;

/// Every index except the primary key and the heap entry.
pub(crate) const DROPPABLE_INDEXES_QUERY: &str = r#"
    SELECT i.name
    FROM sys.indexes i
    JOIN sys.objects o ON i.object_id = o.object_id
    JOIN sys.schemas s ON o.schema_id = s.schema_id
    WHERE s.name = @P1 AND o.name = @P2
      AND i.is_primary_key = 0
      AND i.type > 0
    ORDER BY i.name
"#;

/// Per-index outcome of [`IndexManager::drop_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropReport {
    pub dropped: Vec<String>,
    /// Index name and the error text.
    pub failed: Vec<(String, String)>,
}

impl DropReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Index maintenance around a copy.
#[derive(Debug, Clone, Default)]
pub struct IndexManager {
    /// Log statements instead of running them.
    pub dry_run: bool,
}

impl IndexManager {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Drop every non-PK index on `schema.table`.
    ///
    /// Each DROP is attempted independently; a failure is logged and
    /// recorded in the report and the remaining indexes are still dropped.
    pub async fn drop_all(
        &self,
        session: &mut dyn Session,
        schema: &str,
        table: &str,
    ) -> Result<DropReport> {
        let rs = session
            .query(&Statement::new(DROPPABLE_INDEXES_QUERY).bind(schema).bind(table))
            .await?;
        let names: Vec<String> = rs
            .rows
            .iter()
            .filter_map(|r| r.first().and_then(SqlValue::as_str).map(str::to_string))
            .collect();

        let mut report = DropReport::default();
        for name in names {
            let sql = drop_index_sql(&name, schema, table)?;
            if self.dry_run {
                info!("[dry run] {}", sql);
                report.dropped.push(name);
                continue;
            }
            match session.execute(&Statement::new(sql)).await {
                Ok(_) => {
                    debug!("Dropped index {} on {}.{}", name, schema, table);
                    report.dropped.push(name);
                }
                Err(e) => {
                    warn!("Failed to drop index {} on {}.{}: {}", name, schema, table, e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        info!(
            "{}.{}: dropped {} indexes ({} failed)",
            schema,
            table,
            report.dropped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Create the source table's indexes on `schema.table`.
    ///
    /// Stops at the first failure; duplicate names surface as driver errors.
    pub async fn create_all(
        &self,
        source: &TableDescriptor,
        session: &mut dyn Session,
        schema: &str,
        table: &str,
    ) -> Result<usize> {
        let mut created = 0;
        for index in &source.indexes {
            let sql = create_index_sql(index, schema, table)?;
            if self.dry_run {
                info!("[dry run] {}", sql);
                continue;
            }
            session
                .execute(&Statement::new(sql))
                .await
                .map_err(|e| {
                    CopyError::execution(
                        format!("create index {} on {}.{}", index.name, schema, table),
                        e,
                    )
                })?;
            debug!("Created index {} on {}.{}", index.name, schema, table);
            created += 1;
        }
        info!("{}.{}: created {} indexes", schema, table, created);
        Ok(created)
    }
}
