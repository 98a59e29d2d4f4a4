//! Identifier validation and quoting.
//!
//! Table, column, index and schema names cannot be bound as statement
//! parameters, so every generated statement routes them through this module:
//!
//! 1. Validate the identifier (non-empty, no NUL bytes, bounded length).
//! 2. Wrap it in SQL Server brackets.
//! 3. Escape closing brackets inside the name by doubling them.
//!
//! Raw predicate text supplied by the operator (where-clause, delete-where,
//! joins) is not an identifier and is passed through verbatim.

use crate::error::{CopyError, Result};

/// SQL Server's `sysname` limit.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding 128 characters
///
/// # Errors
///
/// Returns `CopyError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CopyError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(CopyError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(CopyError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.chars().count(),
            name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier using brackets.
///
/// ```ignore
/// assert_eq!(quote_ident("users")?, "[users]");
/// assert_eq!(quote_ident("table]name")?, "[table]]name]");
/// ```
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Qualify a table name with its schema: `[schema].[table]`.
pub fn qualify(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}

/// Quote and comma-join a column list.
pub fn quote_list<S: AsRef<str>>(names: &[S]) -> Result<String> {
    let quoted = names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}

/// Render a name the way SQL Server prints it in DDL: bare when it is a
/// regular identifier, bracket quoted otherwise.
///
/// Regular identifiers start with a letter or `_` and contain only letters,
/// digits, `_`, `@`, `#` and `$`.
pub fn display_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    let mut chars = name.chars();
    let regular = chars
        .next()
        .map(|c| c.is_alphabetic() || c == '_')
        .unwrap_or(false)
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '@' | '#' | '$'));
    if regular && !is_reserved(name) {
        Ok(name.to_string())
    } else {
        quote_ident(name)
    }
}

/// Transact-SQL reserved keywords. None of them may appear bare as a
/// table, column, constraint or schema name.
const RESERVED: &[&str] = &[
    "add", "all", "alter", "and", "any", "as", "asc", "authorization", "backup", "begin",
    "between", "break", "browse", "bulk", "by", "cascade", "case", "check", "checkpoint",
    "close", "clustered", "coalesce", "collate", "column", "commit", "compute", "constraint",
    "contains", "containstable", "continue", "convert", "create", "cross", "current",
    "current_date", "current_time", "current_timestamp", "current_user", "cursor", "database",
    "dbcc", "deallocate", "declare", "default", "delete", "deny", "desc", "disk", "distinct",
    "distributed", "double", "drop", "dump", "else", "end", "errlvl", "escape", "except",
    "exec", "execute", "exists", "exit", "external", "fetch", "file", "fillfactor", "for",
    "foreign", "freetext", "freetexttable", "from", "full", "function", "goto", "grant",
    "group", "having", "holdlock", "identity", "identity_insert", "identitycol", "if", "in",
    "index", "inner", "insert", "intersect", "into", "is", "join", "key", "kill", "left",
    "like", "lineno", "load", "merge", "national", "nocheck", "nonclustered", "not", "null",
    "nullif", "of", "off", "offsets", "on", "open", "opendatasource", "openquery",
    "openrowset", "openxml", "option", "or", "order", "outer", "over", "percent", "pivot",
    "plan", "precision", "primary", "print", "proc", "procedure", "public", "raiserror",
    "read", "readtext", "reconfigure", "references", "replication", "restore", "restrict",
    "return", "revert", "revoke", "right", "rollback", "rowcount", "rowguidcol", "rule",
    "save", "schema", "securityaudit", "select", "semantickeyphrasetable",
    "semanticsimilaritydetailstable", "semanticsimilaritytable", "session_user", "set",
    "setuser", "shutdown", "some", "statistics", "system_user", "table", "tablesample",
    "textsize", "then", "to", "top", "tran", "transaction", "trigger", "truncate",
    "try_convert", "tsequal", "union", "unique", "unpivot", "update", "updatetext", "use",
    "user", "values", "varying", "view", "waitfor", "when", "where", "while", "with",
    "within", "writetext",
];

fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name.to_ascii_lowercase().as_str())
}
