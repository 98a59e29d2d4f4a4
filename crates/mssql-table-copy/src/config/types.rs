//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database rows are read from.
    pub source: ConnectionConfig,

    /// Database rows are written to.
    pub target: ConnectionConfig,

    /// Copy/compare behavior.
    #[serde(default)]
    pub job: JobConfig,
}

/// How a session authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// SQL Server login with user and password.
    #[default]
    SqlPassword,

    /// Pre-acquired Azure AD access token.
    AadToken,
}

/// One SQL Server endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Schema tables are read from or written to (default: "dbo").
    #[serde(default = "default_dbo_schema")]
    pub schema: String,

    /// Authentication mode (default: sql_password).
    #[serde(default)]
    pub authentication: AuthMethod,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Access token for `aad_token`. Falls back to `MSSQL_ACCESS_TOKEN`.
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("authentication", &self.authentication)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

impl ConnectionConfig {
    /// `host:port/database`, for logs.
    pub fn describe(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// What to copy and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Explicit table names in the source schema.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Copy every base table of the source schema.
    #[serde(default)]
    pub all_tables: bool,

    /// Regular expression a table name must match from its first character.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_filter: Option<String>,

    /// Views to copy or compare.
    #[serde(default)]
    pub views: Vec<String>,

    /// Drop and recreate the target table from source metadata.
    #[serde(default)]
    pub create_table: bool,

    /// Truncate the target table before copying.
    #[serde(default)]
    pub truncate_table: bool,

    /// Recreate source indexes on the target after copying.
    #[serde(default)]
    pub copy_indices: bool,

    /// Drop target indexes before copying.
    #[serde(default)]
    pub drop_indices: bool,

    /// Copy row data (default: true).
    #[serde(default = "default_true")]
    pub copy_data: bool,

    /// Read and log, but never write to the target.
    #[serde(default)]
    pub dry_run: bool,

    /// Rows per page (default: 50000).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// 1-based page to resume from (default: 1).
    #[serde(default = "default_page_start")]
    pub page_start: usize,

    /// Predicate appended to the source SELECT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,

    /// Predicate for pre-deleting matching target rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_where: Option<String>,

    /// Join fragments; the base table is aliased `source_table`.
    #[serde(default)]
    pub joins: Vec<String>,

    /// Append-only progress log enabling resumable runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_file: Option<PathBuf>,

    /// Log every statement under the `sql` target.
    #[serde(default)]
    pub debug_sql: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            all_tables: false,
            table_filter: None,
            views: Vec::new(),
            create_table: false,
            truncate_table: false,
            copy_indices: false,
            drop_indices: false,
            copy_data: true,
            dry_run: false,
            page_size: default_page_size(),
            page_start: default_page_start(),
            where_clause: None,
            delete_where: None,
            joins: Vec::new(),
            progress_file: None,
            debug_sql: false,
        }
    }
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_dbo_schema() -> String {
    "dbo".to_string()
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> usize {
    50_000
}

fn default_page_start() -> usize {
    1
}
