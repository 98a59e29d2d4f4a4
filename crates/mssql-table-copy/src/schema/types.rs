//! Table metadata snapshots produced by reflection.

use serde::{Deserialize, Serialize};

/// Type-specific size information for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeFacet {
    /// Type carries no size (int, bit, date, ...).
    None,
    /// Character/binary length. `None` or non-positive means `max`.
    Length(Option<i32>),
    /// Exact-numeric precision and scale.
    Exact {
        precision: Option<u8>,
        scale: Option<u8>,
    },
    /// Fractional-second precision for temporal types.
    Fractional(Option<u8>),
}

/// Column metadata as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Base type name, e.g. `nvarchar` or `decimal`.
    pub data_type: String,
    pub nullable: bool,
    /// Default expression text exactly as stored, e.g. `((0))`.
    pub default: Option<String>,
    pub facet: SizeFacet,
    pub is_identity: bool,
}

impl ColumnDescriptor {
    /// True for the integer and exact-numeric family.
    pub fn is_numeric_key_type(&self) -> bool {
        matches!(
            self.data_type.to_lowercase().as_str(),
            "int" | "bigint" | "smallint" | "tinyint" | "decimal" | "numeric"
        )
    }

    /// Precision and scale for decimal/numeric columns, defaulting to (18, 0).
    pub fn exact_numeric(&self) -> Option<(u8, u8)> {
        match self.data_type.to_lowercase().as_str() {
            "decimal" | "numeric" => match self.facet {
                SizeFacet::Exact {
                    precision: Some(p),
                    scale,
                } if p > 0 => Some((p, scale.unwrap_or(0))),
                _ => Some((18, 0)),
            },
            _ => None,
        }
    }
}

/// Storage kind of a primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyStorage {
    Clustered,
    Nonclustered,
}

impl KeyStorage {
    pub fn as_sql(&self) -> &'static str {
        match self {
            KeyStorage::Clustered => "CLUSTERED",
            KeyStorage::Nonclustered => "NONCLUSTERED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyDescriptor {
    /// Constraint name.
    pub name: String,
    /// Key columns in key order.
    pub columns: Vec<String>,
    pub storage: KeyStorage,
}

/// A non-PK, non-unique-constraint index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub is_unique: bool,
    /// Key columns in index order.
    pub columns: Vec<String>,
}

impl IndexDescriptor {
    /// Lower-cased, sorted column set used for comparison.
    pub fn column_set(&self) -> Vec<String> {
        let mut set: Vec<String> = self.columns.iter().map(|c| c.to_lowercase()).collect();
        set.sort();
        set.dedup();
        set
    }
}

/// Full reflected shape of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    /// Columns in catalog-declared order.
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Option<PrimaryKeyDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
}

impl TableDescriptor {
    /// Get the fully qualified table name (unquoted).
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_identity(&self) -> bool {
        self.columns.iter().any(|c| c.is_identity)
    }

    pub fn pk_columns(&self) -> &[String] {
        self.primary_key
            .as_ref()
            .map(|pk| pk.columns.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, data_type: &str, facet: SizeFacet) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            default: None,
            facet,
            is_identity: false,
        }
    }

    #[test]
    fn test_numeric_key_types() {
        assert!(col("id", "INT", SizeFacet::None).is_numeric_key_type());
        assert!(col("id", "numeric", SizeFacet::None).is_numeric_key_type());
        assert!(!col("id", "uniqueidentifier", SizeFacet::None).is_numeric_key_type());
        assert!(!col("id", "nvarchar", SizeFacet::Length(Some(10))).is_numeric_key_type());
    }

    #[test]
    fn test_exact_numeric_defaults() {
        let known = col(
            "amount",
            "decimal",
            SizeFacet::Exact {
                precision: Some(10),
                scale: Some(2),
            },
        );
        assert_eq!(known.exact_numeric(), Some((10, 2)));
        let unknown = col(
            "amount",
            "numeric",
            SizeFacet::Exact {
                precision: None,
                scale: None,
            },
        );
        assert_eq!(unknown.exact_numeric(), Some((18, 0)));
        assert_eq!(col("id", "int", SizeFacet::None).exact_numeric(), None);
    }

    #[test]
    fn test_index_column_set_ignores_order_and_case() {
        let a = IndexDescriptor {
            name: "IX_a".into(),
            is_unique: false,
            columns: vec!["B".into(), "a".into()],
        };
        let b = IndexDescriptor {
            name: "IX_other".into(),
            is_unique: true,
            columns: vec!["a".into(), "b".into()],
        };
        assert_eq!(a.column_set(), b.column_set());
    }
}
