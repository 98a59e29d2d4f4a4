//! View replication: fetch the source definition, retarget it, recreate it.

use regex::{Captures, Regex};
use tracing::info;

use crate::core::{qualify, Statement};
use crate::error::Result;
use crate::schema::{object_exists, view_definition, ObjectKind};
use crate::session::Session;

/// Replace every `<source_schema>.` (bracketed or bare, any case) with the
/// target schema. The schema must start the text or follow a character that
/// cannot continue an identifier, so `mydbo.t` is left alone.
///
/// This is a textual rewrite. Occurrences inside string literals or
/// comments are rewritten too.
pub fn rewrite_schema_prefix(
    definition: &str,
    source_schema: &str,
    target_schema: &str,
) -> Result<String> {
    if source_schema.eq_ignore_ascii_case(target_schema) {
        return Ok(definition.to_string());
    }
    let pattern = format!(
        r"(?i)(^|[^\w\]@#$])(\[)?{}(\])?\.",
        regex::escape(source_schema)
    );
    let re = Regex::new(&pattern)?;
    let rewritten = re.replace_all(definition, |caps: &Captures<'_>| {
        let prefix = caps.get(1).map_or("", |m| m.as_str());
        if caps.get(2).is_some() && caps.get(3).is_some() {
            format!("{}[{}].", prefix, target_schema)
        } else {
            format!(
                "{}{}{}{}.",
                prefix,
                caps.get(2).map_or("", |m| m.as_str()),
                target_schema,
                caps.get(3).map_or("", |m| m.as_str())
            )
        }
    });
    Ok(rewritten.into_owned())
}

/// Recreate `source_schema.view` on the target under `target_schema`.
///
/// An existing target view of the same name is dropped first.
pub async fn copy_view(
    source: &mut dyn Session,
    target: &mut dyn Session,
    source_schema: &str,
    target_schema: &str,
    view: &str,
    dry_run: bool,
) -> Result<()> {
    let definition = view_definition(source, source_schema, view).await?;
    let definition = rewrite_schema_prefix(&definition, source_schema, target_schema)?;
    let target_view = qualify(target_schema, view)?;

    if object_exists(target, target_schema, view, ObjectKind::View).await? {
        let drop = format!("DROP VIEW {}", target_view);
        if dry_run {
            info!("[dry run] {}", drop);
        } else {
            target.execute(&Statement::new(drop)).await?;
            info!("Dropped existing view {}", target_view);
        }
    }

    if dry_run {
        info!("[dry run] {}", definition.trim());
        return Ok(());
    }
    target.execute(&Statement::new(definition)).await?;
    info!("Created view {}", target_view);
    Ok(())
}
