use anyhow::{bail, Context, Result};
use clap::Parser;
use save_grail_json::browser;
use save_grail_json::db::{self, Db, SchemaReport};
use save_grail_json::ingest::{expand_inputs, ingest_many, FileOutcome, FileReport, IngestSummary};
use save_grail_json::Config;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "save-grail-json")]
#[command(version)]
#[command(about = "Ingest grail trading-analysis JSON files into a SQLite store")]
struct Args {
    /// Files, directories or glob patterns to ingest
    files: Vec<String>,

    /// Launch the interactive file browser
    #[arg(long)]
    tui: bool,

    /// Path to config.toml (defaults to $GRAIL_DB_CONFIG, then ./config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the database file from the config
    #[arg(long)]
    database: Option<PathBuf>,

    /// Recompute extracted columns for every stored record
    #[arg(long)]
    backfill: bool,

    /// Ensure the schema and print store statistics without ingesting
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?.with_database_override(args.database.clone())?;

    // Logs go to stderr; stdout carries the per-file outcome lines
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", config.ingest.log_level.as_str())
    ).init();

    log::debug!("Database path: {}", config.db_path().display());

    let db = Db::from_config(&config);
    let schema = db
        .connect()
        .await
        .with_context(|| format!("Cannot use database {}", config.db_path().display()))?;
    log_schema_changes(&schema);

    if args.check {
        return run_check(&db, &schema).await;
    }

    if args.backfill {
        let report = db.with_connection(|conn| db::backfill(conn)).await?;
        println!(
            "Backfill: {} scanned, {} updated, {} failed",
            report.scanned, report.updated, report.failed
        );
        if args.files.is_empty() && !args.tui {
            return Ok(exit_code(report.failed > 0));
        }
    }

    if args.tui {
        let cwd = std::env::current_dir().context("Cannot determine working directory")?;
        browser::run(&db, &cwd).await?;
        return Ok(ExitCode::SUCCESS);
    }

    if args.files.is_empty() {
        bail!("No input files given. Pass files, directories or glob patterns, or use --tui");
    }

    let paths = expand_inputs(&args.files, config.ingest.recursive);
    println!("Processing {} file(s)...\n", paths.len());

    let summary = ingest_many(&db, &paths).await;
    print_outcomes(&summary);
    print_summary(&summary);

    Ok(exit_code(summary.has_errors()))
}

async fn run_check(db: &Db, schema: &SchemaReport) -> Result<ExitCode> {
    let count = db.with_connection(|conn| db::count_documents(conn)).await?;
    println!("Database: {}", db.path().display());
    println!("Records:  {}", count);
    if schema.is_noop() {
        println!("Schema:   up to date");
    } else {
        println!("Schema:   migrated ({} column(s) added, {} index(es) created, {} raw row(s) converted)",
            schema.added_columns.len(),
            schema.created_indexes.len(),
            schema.converted_raw_rows,
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn log_schema_changes(schema: &SchemaReport) {
    if schema.created_table {
        log::info!("Created new store");
    }
    if !schema.added_columns.is_empty() {
        log::info!("Added columns: {}", schema.added_columns.join(", "));
    }
    if let Some(report) = &schema.backfill {
        log::info!(
            "Backfilled {} record(s) ({} updated, {} failed)",
            report.scanned,
            report.updated,
            report.failed
        );
    }
}

/// Per-file outcome lines go to stdout; diagnostics stay on stderr through the logger.
fn print_outcomes(summary: &IngestSummary) {
    for report in &summary.reports {
        println!("{}", outcome_line(report));
    }
}

fn outcome_line(report: &FileReport) -> String {
    let path = report.path.display();
    match &report.outcome {
        FileOutcome::Inserted => format!("✓ {} (new)", path),
        FileOutcome::Updated => format!("↻ {} (updated)", path),
        FileOutcome::Duplicate => format!("⊘ {} (duplicate content, skipped)", path),
        FileOutcome::Error(msg) => format!("✗ {}: {}", path, msg),
    }
}

fn print_summary(summary: &IngestSummary) {
    let rule = "=".repeat(60);
    println!("\n{}", rule);
    println!("Inserted (new):        {} file(s)", summary.inserted);
    if summary.updated > 0 {
        println!("Updated (changed):     {} file(s)", summary.updated);
    }
    if summary.skipped > 0 {
        println!("Skipped (duplicates):  {} file(s)", summary.skipped);
    }
    if summary.errors > 0 {
        println!("Errors:                {} file(s)", summary.errors);
    }
    println!("{}", rule);
}

fn exit_code(failed: bool) -> ExitCode {
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
