//! Replication workflow: table selection, per-table pipeline, comparison.

use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{Config, JobConfig};
use crate::core::{qualify, Statement};
use crate::error::Result;
use crate::indexes::IndexManager;
use crate::schema::{
    create_table_sql, list_objects, object_exists, reflect_table, ObjectKind, TableDescriptor,
};
use crate::session::{MssqlSession, Session};
use crate::state::{OperationId, OperationKind, ProgressTracker, Tracked};
use crate::transfer::{CopyEngine, RowFilter};
use crate::verify::{compare_table, compare_view, ComparisonFinding, ObjectComparison};
use crate::views::copy_view;

/// Which connection a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn label(&self) -> &'static str {
        match self {
            Side::Source => "source",
            Side::Target => "target",
        }
    }
}

/// Open a single connection, returning it with its configured schema.
pub async fn connect_side(config: &Config, side: Side) -> Result<(MssqlSession, String)> {
    let conn = match side {
        Side::Source => &config.source,
        Side::Target => &config.target,
    };
    let session = MssqlSession::connect(side.label(), conn).await?;
    Ok((session, conn.schema.clone()))
}

/// Outcome of a replication run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub tables_ok: Vec<String>,
    /// Table name and error message.
    pub tables_failed: Vec<(String, String)>,
    pub views_ok: Vec<String>,
    pub views_failed: Vec<(String, String)>,
    /// Steps skipped because the progress log already had them.
    pub steps_skipped: usize,
    pub rows_copied: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.tables_failed.is_empty() && self.views_failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct TableReport {
    rows: u64,
    skipped: usize,
}

impl TableReport {
    fn note<T>(&mut self, outcome: Tracked<T>) -> Option<T> {
        match outcome {
            Tracked::Ran(value) => Some(value),
            Tracked::Skipped => {
                self.skipped += 1;
                None
            }
        }
    }
}

/// Names of all base tables in `schema`, filtered by the job's table filter.
pub async fn list_tables(
    session: &mut dyn Session,
    schema: &str,
    job: &JobConfig,
) -> Result<Vec<String>> {
    let names = list_objects(session, schema, ObjectKind::Table).await?;
    Ok(filter_names(names, job.table_regex()?.as_ref()))
}

fn filter_names(names: Vec<String>, filter: Option<&Regex>) -> Vec<String> {
    match filter {
        Some(re) => names.into_iter().filter(|n| re.is_match(n)).collect(),
        None => names,
    }
}

/// Drives table and view replication between one source and one target.
pub struct Replicator {
    source: Box<dyn Session>,
    target: Box<dyn Session>,
    source_schema: String,
    target_schema: String,
    job: JobConfig,
    filter: Option<Regex>,
    tracker: ProgressTracker,
}

impl Replicator {
    /// Build from open sessions.
    ///
    /// The job is resolved through [`JobConfig::effective`]. On a dry run the
    /// tracker is made read-only so completed steps are still reported as
    /// skipped but nothing is appended.
    pub fn new(
        source: Box<dyn Session>,
        target: Box<dyn Session>,
        source_schema: &str,
        target_schema: &str,
        job: &JobConfig,
        tracker: ProgressTracker,
    ) -> Result<Self> {
        let job = job.effective();
        let filter = job.table_regex()?;
        let tracker = if job.dry_run {
            tracker.into_read_only()
        } else {
            tracker
        };
        Ok(Self {
            source,
            target,
            source_schema: source_schema.to_string(),
            target_schema: target_schema.to_string(),
            job,
            filter,
            tracker,
        })
    }

    /// Open both connections and the progress log.
    pub async fn connect(config: &Config) -> Result<Self> {
        let source = MssqlSession::connect("source", &config.source).await?;
        let target = MssqlSession::connect("target", &config.target).await?;
        let tracker = ProgressTracker::from_option(config.job.progress_file.as_deref())?;
        Self::new(
            Box::new(source),
            Box::new(target),
            &config.source.schema,
            &config.target.schema,
            &config.job,
            tracker,
        )
    }

    pub fn job(&self) -> &JobConfig {
        &self.job
    }

    /// Tables to process: the explicit list, or every source table when
    /// `all_tables` or a filter is set; then the anchored filter.
    pub async fn select_tables(&mut self) -> Result<Vec<String>> {
        let names = if !self.job.tables.is_empty() {
            self.job.tables.clone()
        } else if self.job.all_tables || self.filter.is_some() {
            list_objects(self.source.as_mut(), &self.source_schema, ObjectKind::Table).await?
        } else {
            warn!("No tables selected (set tables, all_tables or table_filter)");
            Vec::new()
        };
        let selected = filter_names(names, self.filter.as_ref());
        info!("Selected {} tables from {}", selected.len(), self.source_schema);
        Ok(selected)
    }

    /// Run the write pipeline for every selected table, then every view.
    ///
    /// A failing table is logged and recorded in the summary; the run moves
    /// on to the next table.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let tables = self.select_tables().await?;
        let views = self.job.views.clone();
        let mut summary = RunSummary::default();

        if self.job.dry_run {
            info!("Dry run: no statements will be executed on the target");
        }

        for (i, name) in tables.iter().enumerate() {
            info!("[{}/{}] {}.{}", i + 1, tables.len(), self.source_schema, name);
            match self.replicate_table(name).await {
                Ok(report) => {
                    summary.rows_copied += report.rows;
                    summary.steps_skipped += report.skipped;
                    summary.tables_ok.push(name.clone());
                }
                Err(e) => {
                    error!("{}.{} failed: {}", self.source_schema, name, e);
                    summary.tables_failed.push((name.clone(), e.to_string()));
                }
            }
        }

        for view in &views {
            match self.replicate_view(view).await {
                Ok(skipped) => {
                    summary.steps_skipped += usize::from(skipped);
                    summary.views_ok.push(view.clone());
                }
                Err(e) => {
                    error!("View {}.{} failed: {}", self.source_schema, view, e);
                    summary.views_failed.push((view.clone(), e.to_string()));
                }
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            "Finished in {:?}: {} tables ok, {} failed, {} views ok, {} failed, {} rows, {} steps skipped",
            summary.elapsed,
            summary.tables_ok.len(),
            summary.tables_failed.len(),
            summary.views_ok.len(),
            summary.views_failed.len(),
            summary.rows_copied,
            summary.steps_skipped
        );
        Ok(summary)
    }

    async fn replicate_table(&mut self, name: &str) -> Result<TableReport> {
        let source: &mut dyn Session = self.source.as_mut();
        let target: &mut dyn Session = self.target.as_mut();
        let tracker = &mut self.tracker;
        let job = &self.job;
        let source_schema = self.source_schema.as_str();
        let target_schema = self.target_schema.as_str();
        let dry_run = job.dry_run;

        let descriptor = reflect_table(source, source_schema, name).await?;
        let desc = &descriptor;
        let indexes = IndexManager::new(dry_run);
        let idx = &indexes;
        let mut report = TableReport::default();

        if job.create_table {
            let id = OperationId::new(OperationKind::CreateTable, target_schema, name);
            let t = &mut *target;
            let outcome = tracker
                .run_once(&id, move || recreate_table(t, desc, target_schema, dry_run))
                .await?;
            report.note(outcome);
        }

        if job.drop_indices {
            let id = OperationId::new(OperationKind::DropIndices, target_schema, name);
            let t = &mut *target;
            let outcome = tracker
                .run_once(&id, move || idx.drop_all(t, target_schema, name))
                .await?;
            report.note(outcome);
        }

        if job.truncate_table {
            let id = OperationId::new(OperationKind::TruncateTable, target_schema, name);
            let t = &mut *target;
            let outcome = tracker
                .run_once(&id, move || truncate_table(t, target_schema, name, dry_run))
                .await?;
            report.note(outcome);
        }

        if let Some(predicate) = job.delete_where.as_deref().filter(|p| !p.trim().is_empty()) {
            let id = OperationId::new(OperationKind::DeleteWhere, target_schema, name)
                .with_predicate(predicate);
            let t = &mut *target;
            let outcome = tracker
                .run_once(&id, move || {
                    delete_where(t, target_schema, name, predicate, dry_run)
                })
                .await?;
            report.note(outcome);
        }

        if job.copy_data {
            let filter = RowFilter::new(job.where_clause.clone(), job.joins.clone());
            let id = OperationId::new(OperationKind::CopyData, target_schema, name)
                .with_filter(&filter);
            let engine = CopyEngine::from_job(job);
            let (s, t, f, e) = (&mut *source, &mut *target, &filter, &engine);
            let outcome = tracker
                .run_once(&id, move || e.copy(s, t, desc, target_schema, f))
                .await?;
            if let Some(stats) = report.note(outcome) {
                report.rows = stats.rows;
            }
        }

        if job.copy_indices {
            let id = OperationId::new(OperationKind::CreateIndices, target_schema, name);
            let t = &mut *target;
            let outcome = tracker
                .run_once(&id, move || idx.create_all(desc, t, target_schema, name))
                .await?;
            report.note(outcome);
        }

        Ok(report)
    }

    /// Returns true when the view was skipped.
    async fn replicate_view(&mut self, view: &str) -> Result<bool> {
        let source: &mut dyn Session = self.source.as_mut();
        let target: &mut dyn Session = self.target.as_mut();
        let source_schema = self.source_schema.as_str();
        let target_schema = self.target_schema.as_str();
        let dry_run = self.job.dry_run;

        let id = OperationId::new(OperationKind::CreateView, target_schema, view);
        let outcome = self
            .tracker
            .run_once(&id, move || {
                copy_view(source, target, source_schema, target_schema, view, dry_run)
            })
            .await?;
        Ok(outcome.is_skipped())
    }

    /// Compare every selected table.
    pub async fn compare_tables(&mut self) -> Result<Vec<ObjectComparison>> {
        let tables = self.select_tables().await?;
        let mut results = Vec::with_capacity(tables.len());
        for name in tables {
            let findings = compare_table(
                self.source.as_mut(),
                self.target.as_mut(),
                &self.source_schema,
                &self.target_schema,
                &name,
            )
            .await?;
            results.push(self.report_comparison(&name, findings));
        }
        Ok(results)
    }

    /// Compare every view listed in the job.
    pub async fn compare_views(&mut self) -> Result<Vec<ObjectComparison>> {
        let views = self.job.views.clone();
        let mut results = Vec::with_capacity(views.len());
        for name in views {
            let findings = compare_view(
                self.source.as_mut(),
                self.target.as_mut(),
                &self.source_schema,
                &self.target_schema,
                &name,
            )
            .await?;
            results.push(self.report_comparison(&name, findings));
        }
        Ok(results)
    }

    fn report_comparison(
        &self,
        name: &str,
        findings: Vec<ComparisonFinding>,
    ) -> ObjectComparison {
        let object = format!("{}.{}", self.source_schema, name);
        if findings.is_empty() {
            info!("{}: source and target match", object);
        } else {
            warn!("{}: {} differences", object, findings.len());
        }
        ObjectComparison { object, findings }
    }
}

/// Drop the target table if present, then create it from the source shape.
async fn recreate_table(
    target: &mut dyn Session,
    table: &TableDescriptor,
    target_schema: &str,
    dry_run: bool,
) -> Result<()> {
    let qualified = qualify(target_schema, &table.name)?;
    let create = create_table_sql(table, target_schema)?;

    if object_exists(target, target_schema, &table.name, ObjectKind::Table).await? {
        let drop = format!("DROP TABLE {}", qualified);
        if dry_run {
            info!("[dry run] {}", drop);
        } else {
            target.execute(&Statement::new(drop)).await?;
            info!("Dropped existing table {}", qualified);
        }
    }

    if dry_run {
        info!("[dry run] {}", create);
        return Ok(());
    }
    target.execute(&Statement::new(create)).await?;
    info!("Created table {}", qualified);
    Ok(())
}

async fn truncate_table(
    target: &mut dyn Session,
    schema: &str,
    table: &str,
    dry_run: bool,
) -> Result<()> {
    let sql = format!("TRUNCATE TABLE {}", qualify(schema, table)?);
    if dry_run {
        info!("[dry run] {}", sql);
        return Ok(());
    }
    target.execute(&Statement::new(sql)).await?;
    info!("Truncated {}.{}", schema, table);
    Ok(())
}

/// Delete target rows matching a raw predicate.
async fn delete_where(
    target: &mut dyn Session,
    schema: &str,
    table: &str,
    predicate: &str,
    dry_run: bool,
) -> Result<u64> {
    let sql = format!("DELETE FROM {} WHERE {}", qualify(schema, table)?, predicate);
    if dry_run {
        info!("[dry run] {}", sql);
        return Ok(0);
    }
    let deleted = target.execute(&Statement::new(sql)).await?;
    info!("Deleted {} rows from {}.{}", deleted, schema, table);
    Ok(deleted)
}
