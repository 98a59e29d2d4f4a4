//! Read-only structural and content comparison between source and target.
//!
//! Checks run in a fixed order: target existence (a missing target ends the
//! comparison), column names and types in both directions, index column
//! sets, exact row counts and, for views, the normalized definition text.
//! Index names and key order are ignored; two indexes match when they cover
//! the same set of columns.
//!
//! Every finding names both sides by session name and qualified object, so
//! comparing B against A yields the same findings as A against B with the
//! labels swapped.

mod normalize;
mod types;

pub use normalize::normalize_definition;
pub use types::{ComparisonFinding, FindingCategory, ObjectComparison};

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use crate::error::Result;
use crate::schema::{
    format_type, object_exists, reflect_table, row_count, view_definition, ObjectKind,
    TableDescriptor,
};
use crate::session::Session;
use crate::views::rewrite_schema_prefix;
use normalize::normalize_type;

fn label(session: &dyn Session, schema: &str, name: &str) -> String {
    format!("{} {}.{}", session.name(), schema, name)
}

/// Compare one table.
pub async fn compare_table(
    source: &mut dyn Session,
    target: &mut dyn Session,
    source_schema: &str,
    target_schema: &str,
    table: &str,
) -> Result<Vec<ComparisonFinding>> {
    compare_object(source, target, source_schema, target_schema, table, ObjectKind::Table).await
}

/// Compare one view, including its stored definition.
///
/// The source definition is retargeted to `target_schema` before comparison
/// so that a view created by this tool compares equal to its origin.
pub async fn compare_view(
    source: &mut dyn Session,
    target: &mut dyn Session,
    source_schema: &str,
    target_schema: &str,
    view: &str,
) -> Result<Vec<ComparisonFinding>> {
    let mut findings =
        compare_object(source, target, source_schema, target_schema, view, ObjectKind::View)
            .await?;
    if findings
        .iter()
        .any(|f| f.category == FindingCategory::ObjectMissing)
    {
        return Ok(findings);
    }

    let src_def = view_definition(source, source_schema, view).await?;
    let tgt_def = view_definition(target, target_schema, view).await?;
    let src_def = rewrite_schema_prefix(&src_def, source_schema, target_schema)?;
    if normalize_definition(&src_def) != normalize_definition(&tgt_def) {
        findings.push(ComparisonFinding::new(
            FindingCategory::DefinitionMismatch,
            format!(
                "definition of {} differs from {}",
                label(source, source_schema, view),
                label(target, target_schema, view)
            ),
        ));
    }
    Ok(findings)
}

async fn compare_object(
    source: &mut dyn Session,
    target: &mut dyn Session,
    source_schema: &str,
    target_schema: &str,
    name: &str,
    kind: ObjectKind,
) -> Result<Vec<ComparisonFinding>> {
    let src_label = label(source, source_schema, name);
    let tgt_label = label(target, target_schema, name);

    if !object_exists(target, target_schema, name, kind).await? {
        info!("{} does not exist", tgt_label);
        return Ok(vec![ComparisonFinding::new(
            FindingCategory::ObjectMissing,
            format!("{} does not exist (compared with {})", tgt_label, src_label),
        )]);
    }

    let src = reflect_table(source, source_schema, name).await?;
    let tgt = reflect_table(target, target_schema, name).await?;

    // Type mismatches are reported once, from the source side.
    let mut findings = compare_columns(&src, &tgt, &src_label, &tgt_label);
    findings.extend(
        compare_columns(&tgt, &src, &tgt_label, &src_label)
            .into_iter()
            .filter(|f| f.category == FindingCategory::ColumnMissing),
    );
    if kind == ObjectKind::Table {
        findings.extend(compare_indexes(&src, &tgt, &src_label, &tgt_label));
        findings.extend(compare_indexes(&tgt, &src, &tgt_label, &src_label));
    }

    let src_rows = row_count(source, source_schema, name).await?;
    let tgt_rows = row_count(target, target_schema, name).await?;
    debug!("Row counts: {} = {}, {} = {}", src_label, src_rows, tgt_label, tgt_rows);
    if src_rows != tgt_rows {
        findings.push(ComparisonFinding::new(
            FindingCategory::RowCountMismatch,
            format!(
                "{} has {} rows, {} has {} rows",
                src_label, src_rows, tgt_label, tgt_rows
            ),
        ));
    }

    Ok(findings)
}

/// Columns of `a` missing from `b`, and type differences for shared columns.
fn compare_columns(
    a: &TableDescriptor,
    b: &TableDescriptor,
    a_label: &str,
    b_label: &str,
) -> Vec<ComparisonFinding> {
    let b_columns: HashMap<String, _> = b
        .columns
        .iter()
        .map(|c| (c.name.to_lowercase(), c))
        .collect();

    let mut findings = Vec::new();
    for col in &a.columns {
        match b_columns.get(&col.name.to_lowercase()) {
            None => findings.push(ComparisonFinding::new(
                FindingCategory::ColumnMissing,
                format!(
                    "column {} exists on {} but not on {}",
                    col.name, a_label, b_label
                ),
            )),
            Some(other) => {
                let (a_type, b_type) = (format_type(col), format_type(other));
                if normalize_type(&a_type) != normalize_type(&b_type) {
                    findings.push(ComparisonFinding::new(
                        FindingCategory::TypeMismatch,
                        format!(
                            "column {} is {} on {} but {} on {}",
                            col.name, a_type, a_label, b_type, b_label
                        ),
                    ));
                }
            }
        }
    }
    findings
}

/// Indexes of `a` whose column set has no counterpart on `b`.
fn compare_indexes(
    a: &TableDescriptor,
    b: &TableDescriptor,
    a_label: &str,
    b_label: &str,
) -> Vec<ComparisonFinding> {
    let b_sets: BTreeSet<Vec<String>> = b.indexes.iter().map(|i| i.column_set()).collect();
    a.indexes
        .iter()
        .filter(|idx| !b_sets.contains(&idx.column_set()))
        .map(|idx| {
            ComparisonFinding::new(
                FindingCategory::IndexMismatch,
                format!(
                    "index {} on ({}) exists on {} but no index covers those columns on {}",
                    idx.name,
                    idx.columns.join(", "),
                    a_label,
                    b_label
                ),
            )
        })
        .collect()
}
