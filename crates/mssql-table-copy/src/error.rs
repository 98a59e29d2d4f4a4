//! Error types for the table copy library.

use thiserror::Error;

/// Main error type for copy and compare operations.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Configuration error (invalid YAML, missing fields, bad filter, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure to open a source or target connection.
    #[error("Connection to {side} failed: {message}")]
    Connectivity { side: String, message: String },

    /// Table or view not found, or catalog metadata missing.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A DDL or DML statement failed.
    #[error("Execution failed ({context}): {message}")]
    Execution { context: String, message: String },

    /// Driver error that has not been given context yet.
    #[error("Database error: {0}")]
    Driver(#[from] tiberius::error::Error),

    /// IO error (progress log, config file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid table filter expression
    #[error("Invalid table filter: {0}")]
    Regex(#[from] regex::Error),
}

impl CopyError {
    /// Create a Connectivity error for the given side ("source" or "target").
    pub fn connectivity(side: impl Into<String>, message: impl ToString) -> Self {
        CopyError::Connectivity {
            side: side.into(),
            message: message.to_string(),
        }
    }

    /// Create an Execution error with context about where it occurred.
    pub fn execution(context: impl Into<String>, message: impl ToString) -> Self {
        CopyError::Execution {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CopyError::Config(_) | CopyError::Regex(_) | CopyError::Yaml(_) => 2,
            CopyError::Connectivity { .. } => 3,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;
