pub mod document;
pub mod identity;
pub mod upsert;
pub mod walker;

use std::fmt;
use std::path::{Path, PathBuf};

pub use document::{validate_json_file, LoadedDocument};
pub use identity::fingerprint;
pub use upsert::{decide, resolve, upsert_document, NewDocument, UpsertOutcome};
pub use walker::{discover_json_files, expand_inputs};

use crate::db::Db;
use crate::error::Result;

/// What happened to one input path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Inserted,
    Updated,
    Duplicate,
    Error(String),
}

impl From<UpsertOutcome> for FileOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Inserted => FileOutcome::Inserted,
            UpsertOutcome::Updated => FileOutcome::Updated,
            UpsertOutcome::SkippedDuplicate => FileOutcome::Duplicate,
        }
    }
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Inserted => write!(f, "inserted"),
            FileOutcome::Updated => write!(f, "updated"),
            FileOutcome::Duplicate => write!(f, "duplicate"),
            FileOutcome::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Outcome for one input path, in input order
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Aggregated result of a batch
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub reports: Vec<FileReport>,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl IngestSummary {
    fn record(&mut self, path: PathBuf, outcome: FileOutcome) {
        match &outcome {
            FileOutcome::Inserted => self.inserted += 1,
            FileOutcome::Updated => self.updated += 1,
            FileOutcome::Duplicate => self.skipped += 1,
            FileOutcome::Error(_) => self.errors += 1,
        }
        self.reports.push(FileReport { path, outcome });
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

/// Ingest a single file: read, parse, fingerprint, extract, resolve.
pub async fn ingest_file(db: &Db, path: &Path) -> Result<UpsertOutcome> {
    let loaded = LoadedDocument::load(path)?;
    let doc = NewDocument::from_loaded(&loaded);
    upsert_document(db, doc).await
}

/// Ingest every path in order. Per-file failures are recorded and never
/// abort the batch; the summary holds exactly one report per input path.
pub async fn ingest_many(db: &Db, paths: &[PathBuf]) -> IngestSummary {
    let mut summary = IngestSummary::default();

    for path in paths {
        let outcome = match ingest_file(db, path).await {
            Ok(outcome) => FileOutcome::from(outcome),
            Err(e) => {
                log::warn!("Failed to ingest {}: {}", path.display(), e);
                FileOutcome::Error(e.to_string())
            }
        };
        log::debug!("{}: {}", path.display(), outcome);
        summary.record(path.clone(), outcome);
    }

    log::info!(
        "Ingested {} file(s): {} inserted, {} updated, {} duplicates, {} errors",
        summary.total(),
        summary.inserted,
        summary.updated,
        summary.skipped,
        summary.errors
    );
    summary
}
