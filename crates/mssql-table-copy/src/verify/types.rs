//! Comparison findings.

use std::fmt;

use serde::Serialize;

/// Kind of difference between a source and a target object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    /// The target table or view does not exist.
    ObjectMissing,
    ColumnMissing,
    TypeMismatch,
    IndexMismatch,
    RowCountMismatch,
    DefinitionMismatch,
}

impl FindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::ObjectMissing => "object-missing",
            FindingCategory::ColumnMissing => "column-missing",
            FindingCategory::TypeMismatch => "type-mismatch",
            FindingCategory::IndexMismatch => "index-mismatch",
            FindingCategory::RowCountMismatch => "row-count-mismatch",
            FindingCategory::DefinitionMismatch => "definition-mismatch",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One difference, with a human-readable description naming both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonFinding {
    pub category: FindingCategory,
    pub description: String,
}

impl ComparisonFinding {
    pub fn new(category: FindingCategory, description: impl Into<String>) -> Self {
        Self {
            category,
            description: description.into(),
        }
    }
}

impl fmt::Display for ComparisonFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.description)
    }
}

/// Findings for one compared table or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectComparison {
    pub object: String,
    pub findings: Vec<ComparisonFinding>,
}

impl ObjectComparison {
    pub fn is_match(&self) -> bool {
        self.findings.is_empty()
    }
}
