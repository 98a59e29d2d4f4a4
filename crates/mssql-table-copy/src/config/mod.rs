//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use regex::Regex;
use std::path::Path;
use tracing::warn;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl JobConfig {
    /// Resolve phase flags against the resume page.
    ///
    /// Table creation, index dropping and index creation cannot resume
    /// mid-table, so they are switched off when `page_start` is not 1.
    pub fn effective(&self) -> JobConfig {
        let mut job = self.clone();
        if job.page_start != 1 {
            if job.create_table || job.drop_indices || job.copy_indices {
                warn!(
                    "page_start={} disables create_table, drop_indices and copy_indices",
                    job.page_start
                );
            }
            job.create_table = false;
            job.drop_indices = false;
            job.copy_indices = false;
        }
        job
    }

    /// Compile the table filter, anchored so it must match from the start.
    pub fn table_regex(&self) -> Result<Option<Regex>> {
        self.table_filter
            .as_deref()
            .map(|pattern| Regex::new(&format!("^(?:{})", pattern)))
            .transpose()
            .map_err(Into::into)
    }
}
