//! Configuration validation.

use super::{AuthMethod, Config, ConnectionConfig};
use crate::error::{CopyError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_connection("source", &config.source)?;
    validate_connection("target", &config.target)?;

    // Copying a schema onto itself would truncate the rows being read
    if config.source.host.eq_ignore_ascii_case(&config.target.host)
        && config.source.port == config.target.port
        && config.source.database.eq_ignore_ascii_case(&config.target.database)
        && config.source.schema.eq_ignore_ascii_case(&config.target.schema)
    {
        return Err(CopyError::Config(
            "source and target cannot be the same database and schema".into(),
        ));
    }

    if config.job.page_size == 0 {
        return Err(CopyError::Config("job.page_size must be at least 1".into()));
    }
    if config.job.page_start == 0 {
        return Err(CopyError::Config("job.page_start must be at least 1".into()));
    }

    config.job.table_regex()?;

    Ok(())
}

fn validate_connection(side: &str, conn: &ConnectionConfig) -> Result<()> {
    if conn.host.is_empty() {
        return Err(CopyError::Config(format!("{}.host is required", side)));
    }
    if conn.database.is_empty() {
        return Err(CopyError::Config(format!("{}.database is required", side)));
    }
    if conn.schema.is_empty() {
        return Err(CopyError::Config(format!("{}.schema is required", side)));
    }
    if conn.authentication == AuthMethod::SqlPassword && conn.user.is_empty() {
        return Err(CopyError::Config(format!(
            "{}.user is required for sql_password authentication",
            side
        )));
    }
    Ok(())
}
