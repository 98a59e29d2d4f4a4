//! Shared building blocks: identifiers, values and statements.

pub mod identifier;
pub mod statement;
pub mod value;

pub use identifier::{display_ident, qualify, quote_ident, quote_list, validate_identifier};
pub use statement::{ResultSet, Statement};
pub use value::{Row, SqlNullType, SqlValue};
