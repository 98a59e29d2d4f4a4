//! Catalog reads for tables and views.

use tracing::debug;

use super::types::{
    ColumnDescriptor, IndexDescriptor, KeyStorage, PrimaryKeyDescriptor, SizeFacet,
    TableDescriptor,
};
use crate::core::{qualify, Row, SqlValue, Statement};
use crate::error::{CopyError, Result};
use crate::session::Session;

pub(crate) const COLUMNS_QUERY: &str = r#"
    SELECT
        c.COLUMN_NAME,
        c.DATA_TYPE,
        CASE WHEN c.IS_NULLABLE = 'YES' THEN 1 ELSE 0 END,
        c.COLUMN_DEFAULT,
        CAST(c.CHARACTER_MAXIMUM_LENGTH AS INT),
        CAST(c.NUMERIC_PRECISION AS INT),
        CAST(c.NUMERIC_SCALE AS INT),
        CAST(c.DATETIME_PRECISION AS INT),
        ISNULL(COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)), c.COLUMN_NAME, 'IsIdentity'), 0)
    FROM INFORMATION_SCHEMA.COLUMNS c
    WHERE c.TABLE_SCHEMA = @P1 AND c.TABLE_NAME = @P2
    ORDER BY c.ORDINAL_POSITION
"#;

pub(crate) const PRIMARY_KEY_QUERY: &str = r#"
    SELECT kc.name, col.name, i.type_desc
    FROM sys.key_constraints kc
    JOIN sys.tables t ON kc.parent_object_id = t.object_id
    JOIN sys.schemas s ON t.schema_id = s.schema_id
    JOIN sys.indexes i ON i.object_id = kc.parent_object_id AND i.index_id = kc.unique_index_id
    JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
    JOIN sys.columns col ON col.object_id = ic.object_id AND col.column_id = ic.column_id
    WHERE kc.type = 'PK' AND s.name = @P1 AND t.name = @P2
    ORDER BY ic.key_ordinal
"#;

pub(crate) const INDEXES_QUERY: &str = r#"
    SELECT i.name, CAST(i.is_unique AS INT), col.name
    FROM sys.indexes i
    JOIN sys.objects o ON i.object_id = o.object_id
    JOIN sys.schemas s ON o.schema_id = s.schema_id
    JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
    JOIN sys.columns col ON col.object_id = ic.object_id AND col.column_id = ic.column_id
    WHERE s.name = @P1 AND o.name = @P2
      AND i.is_primary_key = 0
      AND i.is_unique_constraint = 0
      AND i.type > 0
      AND ic.is_included_column = 0
    ORDER BY i.name, ic.key_ordinal
"#;

pub(crate) const OBJECT_EXISTS_QUERY: &str = r#"
    SELECT COUNT(*)
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2 AND TABLE_TYPE = @P3
"#;

pub(crate) const LIST_OBJECTS_QUERY: &str = r#"
    SELECT TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = @P1 AND TABLE_TYPE = @P2
    ORDER BY TABLE_NAME
"#;

pub(crate) const VIEW_DEFINITION_QUERY: &str = r#"
    SELECT m.definition
    FROM sys.sql_modules m
    JOIN sys.views v ON m.object_id = v.object_id
    JOIN sys.schemas s ON v.schema_id = s.schema_id
    WHERE s.name = @P1 AND v.name = @P2
"#;

/// INFORMATION_SCHEMA table type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    View,
}

impl ObjectKind {
    pub(crate) fn table_type(&self) -> &'static str {
        match self {
            ObjectKind::Table => "BASE TABLE",
            ObjectKind::View => "VIEW",
        }
    }
}

fn text(row: &Row, idx: usize) -> Option<String> {
    row.get(idx).and_then(|v| v.as_str()).map(str::to_string)
}

fn int(row: &Row, idx: usize) -> Option<i64> {
    row.get(idx).and_then(SqlValue::as_i64)
}

fn facet_for(
    data_type: &str,
    length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
    fractional: Option<i64>,
) -> SizeFacet {
    let narrow = |v: Option<i64>| v.and_then(|n| u8::try_from(n).ok());
    match data_type.to_lowercase().as_str() {
        "varchar" | "nvarchar" | "char" | "nchar" | "binary" | "varbinary" => {
            SizeFacet::Length(length.and_then(|n| i32::try_from(n).ok()))
        }
        "decimal" | "numeric" => SizeFacet::Exact {
            precision: narrow(precision),
            scale: narrow(scale),
        },
        "datetime2" | "time" | "datetimeoffset" => SizeFacet::Fractional(narrow(fractional)),
        _ => SizeFacet::None,
    }
}

/// Read column metadata in catalog order.
pub async fn reflect_columns(
    session: &mut dyn Session,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnDescriptor>> {
    let rs = session
        .query(&Statement::new(COLUMNS_QUERY).bind(schema).bind(table))
        .await?;

    let columns = rs
        .rows
        .iter()
        .map(|row| {
            let data_type = text(row, 1).unwrap_or_default();
            ColumnDescriptor {
                name: text(row, 0).unwrap_or_default(),
                facet: facet_for(&data_type, int(row, 4), int(row, 5), int(row, 6), int(row, 7)),
                data_type,
                nullable: int(row, 2).unwrap_or(1) == 1,
                default: text(row, 3),
                is_identity: int(row, 8).unwrap_or(0) == 1,
            }
        })
        .collect::<Vec<_>>();

    debug!("Loaded {} columns for {}.{}", columns.len(), schema, table);
    Ok(columns)
}

/// Read the primary key, if any, with columns in key order.
pub async fn reflect_primary_key(
    session: &mut dyn Session,
    schema: &str,
    table: &str,
) -> Result<Option<PrimaryKeyDescriptor>> {
    let rs = session
        .query(&Statement::new(PRIMARY_KEY_QUERY).bind(schema).bind(table))
        .await?;

    let Some(first) = rs.rows.first() else {
        return Ok(None);
    };

    let storage = match text(first, 2).as_deref() {
        Some("NONCLUSTERED") => KeyStorage::Nonclustered,
        _ => KeyStorage::Clustered,
    };
    let pk = PrimaryKeyDescriptor {
        name: text(first, 0).unwrap_or_default(),
        columns: rs.rows.iter().filter_map(|r| text(r, 1)).collect(),
        storage,
    };

    debug!("Primary key for {}.{}: {:?}", schema, table, pk.columns);
    Ok(Some(pk))
}

/// Read non-PK, non-unique-constraint indexes with their key columns.
pub async fn reflect_indexes(
    session: &mut dyn Session,
    schema: &str,
    table: &str,
) -> Result<Vec<IndexDescriptor>> {
    let rs = session
        .query(&Statement::new(INDEXES_QUERY).bind(schema).bind(table))
        .await?;

    // Rows arrive ordered by index name then key ordinal.
    let mut indexes: Vec<IndexDescriptor> = Vec::new();
    for row in &rs.rows {
        let name = text(row, 0).unwrap_or_default();
        let column = text(row, 2).unwrap_or_default();
        match indexes.last_mut() {
            Some(idx) if idx.name == name => idx.columns.push(column),
            _ => indexes.push(IndexDescriptor {
                name,
                is_unique: int(row, 1).unwrap_or(0) == 1,
                columns: vec![column],
            }),
        }
    }

    debug!("Loaded {} indexes for {}.{}", indexes.len(), schema, table);
    Ok(indexes)
}

/// Reflect a table (or view) in full.
///
/// # Errors
///
/// `CopyError::Schema` when the catalog reports no columns.
pub async fn reflect_table(
    session: &mut dyn Session,
    schema: &str,
    table: &str,
) -> Result<TableDescriptor> {
    let columns = reflect_columns(session, schema, table).await?;
    if columns.is_empty() {
        return Err(CopyError::Schema(format!(
            "{}.{} not found on {} (no columns)",
            schema,
            table,
            session.name()
        )));
    }
    let primary_key = reflect_primary_key(session, schema, table).await?;
    let indexes = reflect_indexes(session, schema, table).await?;

    Ok(TableDescriptor {
        schema: schema.to_string(),
        name: table.to_string(),
        columns,
        primary_key,
        indexes,
    })
}

/// Check whether a table or view exists in the schema.
pub async fn object_exists(
    session: &mut dyn Session,
    schema: &str,
    name: &str,
    kind: ObjectKind,
) -> Result<bool> {
    let rs = session
        .query(
            &Statement::new(OBJECT_EXISTS_QUERY)
                .bind(schema)
                .bind(name)
                .bind(kind.table_type()),
        )
        .await?;
    Ok(rs.scalar().and_then(SqlValue::as_i64).unwrap_or(0) > 0)
}

/// Names of all tables or views in the schema, ordered by name.
pub async fn list_objects(
    session: &mut dyn Session,
    schema: &str,
    kind: ObjectKind,
) -> Result<Vec<String>> {
    let rs = session
        .query(
            &Statement::new(LIST_OBJECTS_QUERY)
                .bind(schema)
                .bind(kind.table_type()),
        )
        .await?;
    Ok(rs.rows.iter().filter_map(|r| text(r, 0)).collect())
}

/// Stored definition text of a view.
pub async fn view_definition(
    session: &mut dyn Session,
    schema: &str,
    view: &str,
) -> Result<String> {
    let rs = session
        .query(&Statement::new(VIEW_DEFINITION_QUERY).bind(schema).bind(view))
        .await?;
    rs.scalar()
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CopyError::Schema(format!(
                "view {}.{} not found on {}",
                schema,
                view,
                session.name()
            ))
        })
}

/// Exact row count.
pub async fn row_count(session: &mut dyn Session, schema: &str, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT_BIG(*) FROM {}", qualify(schema, table)?);
    let rs = session.query(&Statement::new(sql)).await?;
    Ok(rs.scalar().and_then(SqlValue::as_i64).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_table, FakeServer};

    #[tokio::test]
    async fn test_reflect_table_round_trips_catalog() {
        let table = sample_table("dbo", "T");
        let mut fake = FakeServer::new("source").with_table(table.clone(), 3);
        let reflected = reflect_table(&mut fake, "dbo", "T").await.unwrap();
        assert_eq!(reflected, table);
    }

    #[tokio::test]
    async fn test_reflect_missing_table_is_schema_error() {
        let mut fake = FakeServer::new("source");
        let err = reflect_table(&mut fake, "dbo", "nope").await.unwrap_err();
        assert!(matches!(err, CopyError::Schema(_)));
        assert!(err.to_string().contains("dbo.nope"));
    }

    #[tokio::test]
    async fn test_object_exists_and_listing() {
        let mut fake = FakeServer::new("source")
            .with_table(sample_table("dbo", "b_table"), 0)
            .with_table(sample_table("dbo", "a_table"), 0)
            .with_view("dbo", "v_orders", "CREATE VIEW dbo.v_orders AS SELECT 1 AS a");

        assert!(object_exists(&mut fake, "dbo", "a_table", ObjectKind::Table).await.unwrap());
        assert!(!object_exists(&mut fake, "dbo", "v_orders", ObjectKind::Table).await.unwrap());
        assert!(object_exists(&mut fake, "dbo", "v_orders", ObjectKind::View).await.unwrap());

        let tables = list_objects(&mut fake, "dbo", ObjectKind::Table).await.unwrap();
        assert_eq!(tables, vec!["a_table", "b_table"]);
        let views = list_objects(&mut fake, "dbo", ObjectKind::View).await.unwrap();
        assert_eq!(views, vec!["v_orders"]);
    }

    #[tokio::test]
    async fn test_row_count_and_view_definition() {
        let mut fake = FakeServer::new("source")
            .with_table(sample_table("dbo", "T"), 42)
            .with_view("dbo", "v", "CREATE VIEW dbo.v AS SELECT 1 AS a");
        assert_eq!(row_count(&mut fake, "dbo", "T").await.unwrap(), 42);
        assert_eq!(
            view_definition(&mut fake, "dbo", "v").await.unwrap(),
            "CREATE VIEW dbo.v AS SELECT 1 AS a"
        );
        assert!(view_definition(&mut fake, "dbo", "missing").await.is_err());
    }

    #[test]
    fn test_facet_for() {
        assert_eq!(
            facet_for("nvarchar", Some(-1), None, None, None),
            SizeFacet::Length(Some(-1))
        );
        assert_eq!(
            facet_for("decimal", None, Some(10), Some(2), None),
            SizeFacet::Exact {
                precision: Some(10),
                scale: Some(2)
            }
        );
        assert_eq!(
            facet_for("datetime2", None, None, None, Some(7)),
            SizeFacet::Fractional(Some(7))
        );
        assert_eq!(facet_for("int", None, Some(10), Some(0), None), SizeFacet::None);
    }
}
