//! Insert / update / skip resolution for one document.
//!
//! The existence checks only pick the action. The UNIQUE constraints on
//! `file_path` and `content_hash` have the final word: a write that trips one
//! of them lost a race with another writer and is reported as a duplicate.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rusqlite::{params, params_from_iter, Connection, ToSql, TransactionBehavior};
use std::fmt;

use super::document::LoadedDocument;
use crate::db::{Db, TABLE};
use crate::error::Result;
use crate::extract::{asset_type_of, extract, ExtractedRecord, FIELDS};

/// Result of resolving one document against the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    SkippedDuplicate,
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertOutcome::Inserted => write!(f, "inserted"),
            UpsertOutcome::Updated => write!(f, "updated"),
            UpsertOutcome::SkippedDuplicate => write!(f, "duplicate"),
        }
    }
}

/// Pick the action for a document given what the store already holds.
///
/// Content identity wins over location: known content is skipped even when it
/// arrives under a path that already holds something else.
pub fn decide(path_exists: bool, digest_exists: bool) -> UpsertOutcome {
    match (path_exists, digest_exists) {
        (_, true) => UpsertOutcome::SkippedDuplicate,
        (true, false) => UpsertOutcome::Updated,
        (false, false) => UpsertOutcome::Inserted,
    }
}

/// Everything written for one record
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub file_path: String,
    pub content_hash: String,
    pub raw_json: String,
    pub record: ExtractedRecord,
    pub file_created_at: Option<String>,
    pub file_modified_at: Option<String>,
}

impl NewDocument {
    /// Run extraction over a loaded file.
    pub fn from_loaded(doc: &LoadedDocument) -> Self {
        let record = extract(&doc.parsed, asset_type_of(&doc.parsed));
        Self {
            file_path: doc.path_str(),
            content_hash: doc.digest.clone(),
            raw_json: doc.raw.clone(),
            record,
            file_created_at: doc.created_at.map(|t| t.to_rfc3339()),
            file_modified_at: doc.modified_at.map(|t| t.to_rfc3339()),
        }
    }

    /// Statement parameters shared by the INSERT and UPDATE statements.
    fn params<'a>(&'a self, now: &'a String) -> Vec<&'a dyn ToSql> {
        let mut values: Vec<&dyn ToSql> = vec![
            &self.file_path,
            &self.content_hash,
            &self.raw_json,
            &self.file_created_at,
            &self.file_modified_at,
            now,
        ];
        values.extend(self.record.values().iter().map(|v| v as &dyn ToSql));
        values
    }
}

/// Parameters ?1..?6 precede the extracted columns
const FIXED_PARAMS: usize = 6;

static INSERT_SQL: Lazy<String> = Lazy::new(|| {
    let columns = FIELDS.iter().map(|d| d.column).collect::<Vec<_>>().join(", ");
    let placeholders = (0..FIELDS.len())
        .map(|i| format!("?{}", FIXED_PARAMS + 1 + i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {TABLE} (file_path, content_hash, raw_content, file_created_at, \
         file_modified_at, ingested_at, updated_at, {columns}) \
         VALUES (?1, ?2, jsonb(?3), ?4, ?5, ?6, ?6, {placeholders})"
    )
});

static UPDATE_SQL: Lazy<String> = Lazy::new(|| {
    let assignments = FIELDS
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{} = ?{}", d.column, FIXED_PARAMS + 1 + i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {TABLE} SET content_hash = ?2, raw_content = jsonb(?3), file_created_at = ?4, \
         file_modified_at = ?5, updated_at = ?6, {assignments} WHERE file_path = ?1"
    )
});

/// Resolve and apply one document in a single IMMEDIATE transaction.
pub fn resolve(conn: &mut Connection, doc: &NewDocument) -> Result<UpsertOutcome> {
    resolve_at(conn, doc, Utc::now())
}

pub fn resolve_at(
    conn: &mut Connection,
    doc: &NewDocument,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let digest_exists = row_exists(&tx, "content_hash", &doc.content_hash)?;
    let path_exists = row_exists(&tx, "file_path", &doc.file_path)?;
    let outcome = decide(path_exists, digest_exists);

    let now = now.to_rfc3339();
    let written = match outcome {
        UpsertOutcome::Inserted => tx.execute(&INSERT_SQL, params_from_iter(doc.params(&now))),
        UpsertOutcome::Updated => tx.execute(&UPDATE_SQL, params_from_iter(doc.params(&now))),
        UpsertOutcome::SkippedDuplicate => Ok(0),
    };

    match written.map_err(crate::error::GrailError::from) {
        Ok(_) => {
            tx.commit()?;
            log::debug!("{} -> {}", doc.file_path, outcome);
            Ok(outcome)
        }
        Err(e) if e.is_unique_violation() => {
            // transaction rolls back on drop
            log::debug!("{} -> duplicate (lost race: {})", doc.file_path, e);
            Ok(UpsertOutcome::SkippedDuplicate)
        }
        Err(e) => Err(e),
    }
}

fn row_exists(conn: &Connection, column: &str, value: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {TABLE} WHERE {column} = ?1"),
        params![value],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Resolve a document on the blocking pool.
pub async fn upsert_document(db: &Db, doc: NewDocument) -> Result<UpsertOutcome> {
    db.with_connection(move |conn| resolve(conn, &doc)).await
}
