//! Deterministic identifiers for tracked steps.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::transfer::RowFilter;

/// Hex characters kept from the filter digest.
const FINGERPRINT_LEN: usize = 12;

/// A resumable step of the write pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    CreateTable,
    DropIndices,
    TruncateTable,
    DeleteWhere,
    CopyData,
    CreateIndices,
    CreateView,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateTable => "create_table",
            OperationKind::DropIndices => "drop_indices",
            OperationKind::TruncateTable => "truncate_table",
            OperationKind::DeleteWhere => "delete_where",
            OperationKind::CopyData => "copy_data",
            OperationKind::CreateIndices => "create_indices",
            OperationKind::CreateView => "create_view",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<kind>:<schema>.<object>[#<fingerprint>]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId {
    pub kind: OperationKind,
    pub schema: String,
    pub object: String,
    pub fingerprint: Option<String>,
}

impl OperationId {
    pub fn new(kind: OperationKind, schema: &str, object: &str) -> Self {
        Self {
            kind,
            schema: schema.to_string(),
            object: object.to_string(),
            fingerprint: None,
        }
    }

    /// Distinguish runs of the same step over different row subsets.
    #[must_use]
    pub fn with_filter(mut self, filter: &RowFilter) -> Self {
        self.fingerprint = filter_fingerprint(filter);
        self
    }

    /// Distinguish delete-where steps by their predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: &str) -> Self {
        self.fingerprint = Some(digest(&[normalize(predicate)]));
        self
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.kind, self.schema, self.object)?;
        if let Some(fp) = &self.fingerprint {
            write!(f, "#{}", fp)?;
        }
        Ok(())
    }
}

/// Trim and collapse whitespace runs.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn digest(parts: &[String]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Fingerprint of a row filter, `None` when the filter is empty.
pub fn filter_fingerprint(filter: &RowFilter) -> Option<String> {
    if filter.is_empty() {
        return None;
    }
    let mut parts = vec![format!(
        "where={}",
        filter.where_clause.as_deref().map(normalize).unwrap_or_default()
    )];
    parts.extend(filter.joins.iter().map(|j| format!("join={}", normalize(j))));
    Some(digest(&parts))
}
