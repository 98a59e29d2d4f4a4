//! Table metadata: reflection from the catalog and DDL synthesis.

pub mod ddl;
pub mod reflect;
mod types;

pub use ddl::{create_index_sql, create_table_sql, format_type};
pub use reflect::{
    list_objects, object_exists, reflect_indexes, reflect_primary_key, reflect_table, row_count,
    view_definition, ObjectKind,
};
pub use types::{
    ColumnDescriptor, IndexDescriptor, KeyStorage, PrimaryKeyDescriptor, SizeFacet,
    TableDescriptor,
};
