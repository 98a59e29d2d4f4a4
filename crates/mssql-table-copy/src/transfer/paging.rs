//! Page query construction.
//!
//! Two strategies are available:
//!
//! - **Keyset**: single numeric primary key. Rows are ranked with
//!   `ROW_NUMBER()` over the key and each page selects a rank window
//!   `(offset, offset + page_size]`, joined back to the base table.
//! - **Offset**: everything else. `OFFSET .. FETCH NEXT ..` ordered by the
//!   primary key columns, or by a constant when there is no key (row order is
//!   then undefined).
//!
//! The base table is always aliased `source_table` so operator supplied joins
//! and predicates can refer to it.

use crate::core::{qualify, quote_ident, Statement};
use crate::error::Result;
use crate::schema::TableDescriptor;

/// Alias of the base table in every page query.
pub const SOURCE_ALIAS: &str = "source_table";

/// How pages of a table are sliced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagingStrategy {
    /// Rank window over a single numeric key column.
    Keyset { key: String },
    /// `OFFSET/FETCH` ordered by these columns (empty: unordered).
    Offset { order_by: Vec<String> },
}

/// Choose the strategy for a table.
///
/// Composite keys and single non-numeric keys fall back to offset paging.
pub fn select_strategy(table: &TableDescriptor) -> PagingStrategy {
    let pk = table.pk_columns();
    if let [key] = pk {
        if table
            .column(key)
            .map(|c| c.is_numeric_key_type())
            .unwrap_or(false)
        {
            return PagingStrategy::Keyset { key: key.clone() };
        }
    }
    PagingStrategy::Offset {
        order_by: pk.to_vec(),
    }
}

/// Optional row subset: a raw predicate and raw join fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub where_clause: Option<String>,
    pub joins: Vec<String>,
}

impl RowFilter {
    pub fn new(where_clause: Option<String>, joins: Vec<String>) -> Self {
        Self {
            where_clause: where_clause.filter(|w| !w.trim().is_empty()),
            joins: joins.into_iter().filter(|j| !j.trim().is_empty()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.where_clause.is_none() && self.joins.is_empty()
    }

    /// `[s].[t] AS source_table <joins> [WHERE <predicate>]`
    pub(crate) fn from_clause(&self, schema: &str, table: &str) -> Result<String> {
        let mut sql = format!("{} AS {}", qualify(schema, table)?, SOURCE_ALIAS);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join.trim());
        }
        if let Some(predicate) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(predicate.trim());
        }
        Ok(sql)
    }
}

fn aliased(column: &str) -> Result<String> {
    Ok(format!("{}.{}", SOURCE_ALIAS, quote_ident(column)?))
}

fn select_list(table: &TableDescriptor) -> Result<String> {
    let cols = table
        .columns
        .iter()
        .map(|c| aliased(&c.name))
        .collect::<Result<Vec<_>>>()?;
    Ok(cols.join(", "))
}

/// Position of one page within a table copy.
#[derive(Debug, Clone)]
pub struct PageCursor<'a> {
    table: &'a TableDescriptor,
    filter: &'a RowFilter,
    page_size: u64,
    offset: u64,
    page: u64,
}

impl<'a> PageCursor<'a> {
    /// Start at the 1-based `page_start`.
    pub fn new(
        table: &'a TableDescriptor,
        filter: &'a RowFilter,
        page_size: usize,
        page_start: usize,
    ) -> Self {
        let page_size = page_size.max(1) as u64;
        let page = page_start.max(1) as u64;
        Self {
            table,
            filter,
            page_size,
            offset: (page - 1) * page_size,
            page,
        }
    }

    /// Rows before this page.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 1-based page number.
    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn advance(&mut self) {
        self.offset += self.page_size;
        self.page += 1;
    }

    /// Build the query for the current page, choosing the strategy afresh.
    pub fn page_query(&self) -> Result<Statement> {
        let strategy = select_strategy(self.table);
        self.query_for(&strategy)
    }

    pub(crate) fn query_for(&self, strategy: &PagingStrategy) -> Result<Statement> {
        let table = self.table;
        let from = self.filter.from_clause(&table.schema, &table.name)?;
        let columns = select_list(table)?;
        let offset = self.offset as i64;
        let size = self.page_size as i64;

        let stmt = match strategy {
            PagingStrategy::Keyset { key } => {
                let key = aliased(key)?;
                let sql = format!(
                    "SELECT {columns} FROM (\
                     SELECT {key} AS __copy_key, ROW_NUMBER() OVER (ORDER BY {key}) AS __copy_rank \
                     FROM {from}) AS ranked \
                     JOIN {base} AS {alias} ON {key} = ranked.__copy_key \
                     WHERE ranked.__copy_rank > @P1 AND ranked.__copy_rank <= @P2 \
                     ORDER BY ranked.__copy_rank",
                    base = qualify(&table.schema, &table.name)?,
                    alias = SOURCE_ALIAS,
                );
                Statement::new(sql).bind(offset).bind(offset + size)
            }
            PagingStrategy::Offset { order_by } => {
                let order = if order_by.is_empty() {
                    "(SELECT NULL)".to_string()
                } else {
                    order_by
                        .iter()
                        .map(|c| aliased(c))
                        .collect::<Result<Vec<_>>>()?
                        .join(", ")
                };
                let sql = format!(
                    "SELECT {columns} FROM {from} ORDER BY {order} \
                     OFFSET @P1 ROWS FETCH NEXT @P2 ROWS ONLY"
                );
                Statement::new(sql).bind(offset).bind(size)
            }
        };
        Ok(stmt)
    }
}

/// Count the rows a copy will read.
pub fn count_query(table: &TableDescriptor, filter: &RowFilter) -> Result<Statement> {
    Ok(Statement::new(format!(
        "SELECT COUNT_BIG(*) FROM {}",
        filter.from_clause(&table.schema, &table.name)?
    )))
}
