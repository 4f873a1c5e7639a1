pub mod config;
pub mod error;
pub mod db;
pub mod extract;
pub mod ingest;
pub mod browser;

pub use config::Config;
pub use error::{GrailError, Result};
pub use extract::{extract, ExtractedRecord, FieldValue};
pub use ingest::{ingest_file, ingest_many, FileOutcome, IngestSummary, UpsertOutcome};
