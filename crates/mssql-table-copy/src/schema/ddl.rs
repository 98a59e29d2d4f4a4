//! CREATE TABLE / CREATE INDEX text generation.
//!
//! Output is a pure function of the descriptor: the same input always yields
//! the same text.

use super::types::{ColumnDescriptor, IndexDescriptor, SizeFacet, TableDescriptor};
use crate::core::identifier::{display_ident, qualify, quote_ident, quote_list};
use crate::error::Result;

/// Render a column's type with its size facet.
///
/// - `varchar`, `nvarchar`, `char`, `nchar`, `binary`, `varbinary`:
///   `(length)` when a positive length is known, `(max)` otherwise.
/// - `decimal`, `numeric`: `(precision, scale)`, `(18, 0)` when unknown.
/// - `datetime2`: `(fractional precision)` when known.
/// - Anything else is passed through untouched.
pub fn format_type(col: &ColumnDescriptor) -> String {
    let data_type = col.data_type.as_str();
    match data_type.to_lowercase().as_str() {
        "varchar" | "nvarchar" | "char" | "nchar" | "binary" | "varbinary" => match col.facet {
            SizeFacet::Length(Some(len)) if len > 0 => format!("{}({})", data_type, len),
            _ => format!("{}(max)", data_type),
        },
        "decimal" | "numeric" => match col.facet {
            SizeFacet::Exact {
                precision: Some(p),
                scale,
            } if p > 0 => format!("{}({}, {})", data_type, p, scale.unwrap_or(0)),
            _ => format!("{}(18, 0)", data_type),
        },
        "datetime2" => match col.facet {
            SizeFacet::Fractional(Some(n)) => format!("{}({})", data_type, n),
            _ => data_type.to_string(),
        },
        _ => data_type.to_string(),
    }
}

/// One column definition: name, type, identity, nullability, default.
pub fn column_definition(col: &ColumnDescriptor) -> Result<String> {
    let mut def = format!("{} {}", display_ident(&col.name)?, format_type(col));
    if col.is_identity {
        def.push_str(" IDENTITY(1, 1)");
    }
    if !col.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    Ok(def)
}

/// Synthesize `CREATE TABLE <schema>.<table> (...)` for the target schema.
pub fn create_table_sql(table: &TableDescriptor, target_schema: &str) -> Result<String> {
    let mut parts = table
        .columns
        .iter()
        .map(column_definition)
        .collect::<Result<Vec<_>>>()?;

    if let Some(pk) = &table.primary_key {
        let cols = pk
            .columns
            .iter()
            .map(|c| display_ident(c))
            .collect::<Result<Vec<_>>>()?;
        parts.push(format!(
            "CONSTRAINT {} PRIMARY KEY {} ({})",
            display_ident(&pk.name)?,
            pk.storage.as_sql(),
            cols.join(", ")
        ));
    }

    Ok(format!(
        "CREATE TABLE {}.{} ({})",
        display_ident(target_schema)?,
        display_ident(&table.name)?,
        parts.join(", ")
    ))
}

/// `CREATE [UNIQUE ]INDEX [name] ON [schema].[table] (cols)`.
pub fn create_index_sql(index: &IndexDescriptor, schema: &str, table: &str) -> Result<String> {
    let unique = if index.is_unique { "UNIQUE " } else { "" };
    Ok(format!(
        "CREATE {}INDEX {} ON {} ({})",
        unique,
        quote_ident(&index.name)?,
        qualify(schema, table)?,
        quote_list(&index.columns)?
    ))
}

/// `DROP INDEX [name] ON [schema].[table]`.
pub fn drop_index_sql(index_name: &str, schema: &str, table: &str) -> Result<String> {
    Ok(format!(
        "DROP INDEX {} ON {}",
        quote_ident(index_name)?,
        qualify(schema, table)?
    ))
}
