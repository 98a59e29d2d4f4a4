//! mssql-table-copy CLI - paged table copy between SQL Server databases.

use clap::{Args, Parser, Subcommand, ValueEnum};
use mssql_table_copy::exec::run_statements;
use mssql_table_copy::{
    connect_side, list_tables, Config, CopyError, JobConfig, ObjectComparison, Replicator,
    RunSummary, Side,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mssql-table-copy")]
#[command(about = "Copy and compare tables between SQL Server databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml", env = "MSSQL_TABLE_COPY_CONFIG")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Log every SQL statement
    #[arg(long)]
    debug_sql: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy tables (schema, rows, indexes) and views from source to target
    Copy(CopyArgs),

    /// Compare tables and views between source and target
    Compare(CompareArgs),

    /// List tables in the source or target schema
    ListTables {
        /// Connection to list
        #[arg(long, value_enum, default_value = "source")]
        side: SideArg,

        /// Regular expression that table names must match from the start
        #[arg(long)]
        table_filter: Option<String>,
    },

    /// Execute SQL statements on the source or target
    Exec {
        /// Connection to run on
        #[arg(long, value_enum, default_value = "target")]
        side: SideArg,

        /// Read statements from a file (batches separated by GO lines)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Statements to run in order
        sql: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Source,
    Target,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Source => Side::Source,
            SideArg::Target => Side::Target,
        }
    }
}

/// Table and schema selection shared by copy and compare.
#[derive(Args)]
struct SelectionArgs {
    /// Comma-separated table names
    #[arg(long, value_delimiter = ',')]
    tables: Vec<String>,

    /// Process every table in the source schema
    #[arg(long)]
    all_tables: bool,

    /// Regular expression that table names must match from the start
    #[arg(long)]
    table_filter: Option<String>,

    /// Comma-separated view names
    #[arg(long, value_delimiter = ',')]
    views: Vec<String>,

    /// Override source schema
    #[arg(long)]
    source_schema: Option<String>,

    /// Override target schema
    #[arg(long)]
    target_schema: Option<String>,
}

impl SelectionArgs {
    fn apply(self, config: &mut Config) {
        let job = &mut config.job;
        if !self.tables.is_empty() {
            job.tables = self.tables;
        }
        if self.all_tables {
            job.all_tables = true;
        }
        if self.table_filter.is_some() {
            job.table_filter = self.table_filter;
        }
        if !self.views.is_empty() {
            job.views = self.views;
        }
        if let Some(schema) = self.source_schema {
            config.source.schema = schema;
        }
        if let Some(schema) = self.target_schema {
            config.target.schema = schema;
        }
    }
}

#[derive(Args)]
struct CopyArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    /// Drop and recreate target tables from the source definition
    #[arg(long)]
    create_table: bool,

    /// Truncate target tables before copying
    #[arg(long)]
    truncate_table: bool,

    /// Drop non-PK target indexes before copying
    #[arg(long)]
    drop_indices: bool,

    /// Recreate source indexes on the target after copying
    #[arg(long)]
    copy_indices: bool,

    /// Skip the row copy
    #[arg(long)]
    no_copy_data: bool,

    /// Read from the source and log target statements without running them
    #[arg(long)]
    dry_run: bool,

    /// Rows per page
    #[arg(long)]
    page_size: Option<usize>,

    /// 1-based page to resume from
    #[arg(long)]
    page_start: Option<usize>,

    /// Predicate appended to the source query (alias: source_table)
    #[arg(long = "where")]
    where_clause: Option<String>,

    /// Delete target rows matching this predicate before copying
    #[arg(long)]
    delete_where: Option<String>,

    /// Join clause added to the source query (repeatable)
    #[arg(long = "join")]
    joins: Vec<String>,

    /// Progress log enabling resumable runs
    #[arg(long)]
    progress_file: Option<PathBuf>,
}

impl CopyArgs {
    fn apply(self, config: &mut Config) {
        self.selection.apply(config);
        let job: &mut JobConfig = &mut config.job;
        job.create_table |= self.create_table;
        job.truncate_table |= self.truncate_table;
        job.drop_indices |= self.drop_indices;
        job.copy_indices |= self.copy_indices;
        job.dry_run |= self.dry_run;
        if self.no_copy_data {
            job.copy_data = false;
        }
        if let Some(size) = self.page_size {
            job.page_size = size;
        }
        if let Some(page) = self.page_start {
            job.page_start = page;
        }
        if self.where_clause.is_some() {
            job.where_clause = self.where_clause;
        }
        if self.delete_where.is_some() {
            job.delete_where = self.delete_where;
        }
        if !self.joins.is_empty() {
            job.joins = self.joins;
        }
        if self.progress_file.is_some() {
            job.progress_file = self.progress_file;
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CompareKind {
    All,
    Tables,
    Views,
}

#[derive(Args)]
struct CompareArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    /// Which objects to compare
    #[arg(long, value_enum, default_value = "all")]
    kind: CompareKind,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CopyError> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    setup_logging(
        &cli.verbosity,
        &cli.log_format,
        cli.debug_sql || config.job.debug_sql,
    )?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Copy(args) => {
            args.apply(&mut config);
            config.validate()?;
            info!(
                "Copying from {} to {}",
                config.source.describe(),
                config.target.describe()
            );

            let mut replicator = Replicator::connect(&config).await?;
            let summary = replicator.run().await?;
            print_summary(&summary, cli.output_json)?;

            Ok(if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Commands::Compare(args) => {
            args.selection.apply(&mut config);
            config.validate()?;

            let mut replicator = Replicator::connect(&config).await?;
            let mut results = Vec::new();
            if args.kind != CompareKind::Views {
                results.extend(replicator.compare_tables().await?);
            }
            if args.kind != CompareKind::Tables {
                results.extend(replicator.compare_views().await?);
            }
            print_comparisons(&results, cli.output_json)?;

            Ok(if results.iter().all(ObjectComparison::is_match) {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Commands::ListTables { side, table_filter } => {
            if table_filter.is_some() {
                config.job.table_filter = table_filter;
                config.validate()?;
            }
            let (mut session, schema) = connect_side(&config, side.into()).await?;
            let names = list_tables(&mut session, &schema, &config.job).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                for name in &names {
                    println!("{}", name);
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Exec { side, file, sql } => {
            let mut statements = sql;
            if let Some(path) = file {
                statements.extend(split_batches(&std::fs::read_to_string(path)?));
            }
            if statements.iter().all(|s| s.trim().is_empty()) {
                return Err(CopyError::Config(
                    "exec needs at least one statement (arguments or --file)".to_string(),
                ));
            }

            let (mut session, _) = connect_side(&config, side.into()).await?;
            let results = run_statements(&mut session, &statements).await?;
            for result in &results {
                println!("> {}", result.sql);
                for line in result.render() {
                    println!("{}", line);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Split a script on lines containing only `GO`.
fn split_batches(script: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();
    for line in script.lines() {
        if line.trim().eq_ignore_ascii_case("go") {
            batches.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    batches.push(current);
    batches.retain(|b| !b.trim().is_empty());
    batches
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<(), CopyError> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let status = if summary.is_success() {
        "Copy completed!"
    } else {
        "Copy finished with failures"
    };
    println!("\n{}", status);
    println!("  Duration: {:.2}s", summary.elapsed.as_secs_f64());
    println!(
        "  Tables: {}/{}",
        summary.tables_ok.len(),
        summary.tables_ok.len() + summary.tables_failed.len()
    );
    if !summary.views_ok.is_empty() || !summary.views_failed.is_empty() {
        println!(
            "  Views: {}/{}",
            summary.views_ok.len(),
            summary.views_ok.len() + summary.views_failed.len()
        );
    }
    println!("  Rows: {}", summary.rows_copied);
    println!("  Steps skipped (already done): {}", summary.steps_skipped);
    for (name, err) in summary.tables_failed.iter().chain(&summary.views_failed) {
        println!("  ✗ {}: {}", name, err);
    }
    Ok(())
}

fn print_comparisons(results: &[ObjectComparison], json: bool) -> Result<(), CopyError> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    for result in results {
        if result.is_match() {
            println!("  ✓ {}", result.object);
        } else {
            println!("  ✗ {} ({} differences)", result.object, result.findings.len());
            for finding in &result.findings {
                println!("      {}", finding);
            }
        }
    }
    let differing = results.iter().filter(|r| !r.is_match()).count();
    println!(
        "\nCompared {} objects: {} match, {} differ",
        results.len(),
        results.len() - differing,
        differing
    );
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str, debug_sql: bool) -> Result<(), CopyError> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if debug_sql {
        let directive = "sql=debug"
            .parse()
            .map_err(|e| CopyError::Config(format!("invalid log directive: {}", e)))?;
        filter = filter.add_directive(directive);
    }

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
