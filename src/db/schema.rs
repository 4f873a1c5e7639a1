//! Schema manager for the `grail_files` table.
//!
//! `ensure_schema` is safe to run on every start. It reads the live table
//! layout from SQLite (`sqlite_master`, `PRAGMA table_info`) each time instead
//! of trusting any recorded version, and only ever adds: missing columns,
//! conversion of legacy text raw content to JSONB, and missing indexes.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashSet;

use super::backfill::{backfill, BackfillReport};
use crate::error::{GrailError, Result};
use crate::extract::FIELDS;
use crate::ingest::fingerprint;

/// Table holding one row per ingested grail file
pub const TABLE: &str = "grail_files";

/// Key/value bookkeeping for migrations in progress
pub const META_TABLE: &str = "grail_schema_meta";

const BACKFILL_PENDING_KEY: &str = "backfill_pending";

/// Indexes on bookkeeping columns; extracted columns are indexed per descriptor
const BOOKKEEPING_INDEXES: &[&str] = &["ingested_at", "content_hash", "updated_at"];

/// What `ensure_schema` changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaReport {
    pub created_table: bool,
    pub added_columns: Vec<String>,
    pub hashed_rows: usize,
    pub converted_raw_rows: usize,
    pub created_indexes: Vec<String>,
    pub backfill: Option<BackfillReport>,
}

impl SchemaReport {
    /// True when the store already matched the current layout.
    pub fn is_noop(&self) -> bool {
        !self.created_table
            && self.added_columns.is_empty()
            && self.hashed_rows == 0
            && self.converted_raw_rows == 0
            && self.created_indexes.is_empty()
            && self.backfill.is_none()
    }
}

/// `CREATE TABLE` statement for the full current layout.
pub fn create_table_sql() -> String {
    let extracted: Vec<String> = FIELDS
        .iter()
        .map(|d| format!("    {} {}", d.column, d.kind.sql_type()))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {TABLE} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL UNIQUE,
    content_hash TEXT NOT NULL UNIQUE,
    raw_content BLOB NOT NULL,
{},
    file_created_at TEXT,
    file_modified_at TEXT,
    ingested_at TEXT NOT NULL,
    updated_at TEXT
)",
        extracted.join(",\n")
    )
}

/// Every index name with its column, in creation order
pub fn index_definitions() -> Vec<(String, &'static str)> {
    BOOKKEEPING_INDEXES
        .iter()
        .copied()
        .chain(FIELDS.iter().filter(|d| d.indexed).map(|d| d.column))
        .map(|column| (format!("idx_{TABLE}_{column}"), column))
        .collect()
}

/// Bring the store in line with the current field set.
pub fn ensure_schema(conn: &mut Connection) -> Result<SchemaReport> {
    let mut report = apply_additive_changes(conn)?;

    // the marker outlives a killed run, so an unfinished backfill resumes here
    if backfill_pending(conn)? {
        log::info!("Backfilling extracted columns from stored raw content");
        report.backfill = Some(backfill(conn)?);
        set_backfill_pending(conn, false)?;
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing = existing_indexes(&tx)?;
    for (name, column) in index_definitions() {
        if existing.contains(&name) {
            continue;
        }
        tx.execute(
            &format!("CREATE INDEX IF NOT EXISTS {name} ON {TABLE}({column})"),
            [],
        )?;
        log::debug!("Created index {}", name);
        report.created_indexes.push(name);
    }
    tx.commit()?;

    if report.is_noop() {
        log::debug!("Schema for {} is current", TABLE);
    }

    Ok(report)
}

/// Table creation and column migrations, committed together with the
/// backfill marker when extracted columns were added.
fn apply_additive_changes(conn: &mut Connection) -> Result<SchemaReport> {
    let mut report = SchemaReport::default();

    // IMMEDIATE so two processes starting together cannot both add the same column
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if !table_exists(&tx)? {
        tx.execute(&create_table_sql(), [])?;
        report.created_table = true;
        log::info!("Created table {}", TABLE);
    }

    let columns = table_columns(&tx)?;

    if !columns.contains("content_hash") {
        report.hashed_rows = add_content_hash(&tx)?;
    }

    if !columns.contains("updated_at") {
        tx.execute(&format!("ALTER TABLE {TABLE} ADD COLUMN updated_at TEXT"), [])?;
        tx.execute(
            &format!("UPDATE {TABLE} SET updated_at = ingested_at WHERE updated_at IS NULL"),
            [],
        )?;
        report.added_columns.push("updated_at".to_string());
        log::info!("Added column {}.updated_at", TABLE);
    }

    tx.execute(
        &format!("CREATE TABLE IF NOT EXISTS {META_TABLE} (key TEXT PRIMARY KEY, value TEXT NOT NULL)"),
        [],
    )?;

    let mut added_extracted = false;
    for d in FIELDS.iter().filter(|d| !columns.contains(d.column)) {
        tx.execute(
            &format!("ALTER TABLE {TABLE} ADD COLUMN {} {}", d.column, d.kind.sql_type()),
            [],
        )?;
        log::info!("Added column {}.{} ({})", TABLE, d.column, d.kind.sql_type());
        report.added_columns.push(d.column.to_string());
        added_extracted = true;
    }

    report.converted_raw_rows = convert_text_raw_content(&tx)?;

    if added_extracted {
        set_backfill_pending(&tx, true)?;
    }

    tx.commit()?;
    Ok(report)
}

/// Whether a column migration is still waiting for its backfill to finish.
pub fn backfill_pending(conn: &Connection) -> Result<bool> {
    let pending = conn
        .query_row(
            &format!("SELECT value FROM {META_TABLE} WHERE key = ?1"),
            params![BACKFILL_PENDING_KEY],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(pending.as_deref() == Some("1"))
}

fn set_backfill_pending(conn: &Connection, pending: bool) -> Result<()> {
    if pending {
        conn.execute(
            &format!("INSERT OR REPLACE INTO {META_TABLE} (key, value) VALUES (?1, '1')"),
            params![BACKFILL_PENDING_KEY],
        )?;
    } else {
        conn.execute(
            &format!("DELETE FROM {META_TABLE} WHERE key = ?1"),
            params![BACKFILL_PENDING_KEY],
        )?;
    }
    Ok(())
}

fn table_exists(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![TABLE],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Column names of the live table
pub fn table_columns(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({TABLE})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<HashSet<_>, rusqlite::Error>>()?;
    Ok(names)
}

fn existing_indexes(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1",
    )?;
    let names = stmt
        .query_map(params![TABLE], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<HashSet<_>, rusqlite::Error>>()?;
    Ok(names)
}

/// Add `content_hash` to a table that predates duplicate detection.
///
/// SQLite cannot add a UNIQUE column, so uniqueness comes from a unique index
/// created after every row is hashed.
fn add_content_hash(conn: &Connection) -> Result<usize> {
    conn.execute(&format!("ALTER TABLE {TABLE} ADD COLUMN content_hash TEXT"), [])?;

    let rows: Vec<(i64, Vec<u8>)> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, CASE WHEN typeof(raw_content) = 'text' THEN CAST(raw_content AS BLOB) \
             ELSE CAST(json(raw_content) AS BLOB) END FROM {TABLE}"
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        rows
    };

    for (id, bytes) in &rows {
        let digest = fingerprint(bytes);
        conn.execute(
            &format!("UPDATE {TABLE} SET content_hash = ?1 WHERE id = ?2"),
            params![digest, id],
        )?;
    }

    let duplicates = duplicate_hashes(conn)?;
    if !duplicates.is_empty() {
        let listing = duplicates
            .iter()
            .map(|(hash, paths)| format!("{} ({})", hash, paths))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(GrailError::Config(format!(
            "cannot add unique content_hash to {TABLE}: {} content hash(es) are stored more \
             than once: {}. Delete all but one row per hash and run again",
            duplicates.len(),
            listing
        )));
    }

    conn.execute(
        &format!("CREATE UNIQUE INDEX {TABLE}_content_hash_key ON {TABLE}(content_hash)"),
        [],
    )?;

    log::info!("Added column {}.content_hash and hashed {} row(s)", TABLE, rows.len());
    Ok(rows.len())
}

/// Hashes held by more than one row, with the file paths holding each.
fn duplicate_hashes(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT content_hash, group_concat(file_path, ', ') FROM {TABLE} \
         GROUP BY content_hash HAVING COUNT(*) > 1 ORDER BY content_hash"
    ))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

/// Convert raw content stored as JSON text (older layout) to JSONB in place.
fn convert_text_raw_content(conn: &Connection) -> Result<usize> {
    let converted = conn.execute(
        &format!(
            "UPDATE {TABLE} SET raw_content = jsonb(raw_content) \
             WHERE typeof(raw_content) = 'text' AND json_valid(raw_content)"
        ),
        [],
    )?;

    let invalid: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {TABLE} WHERE typeof(raw_content) = 'text'"),
        [],
        |row| row.get(0),
    )?;
    if invalid > 0 {
        log::warn!(
            "{} row(s) in {} hold raw content that is not valid JSON; left as text",
            invalid,
            TABLE
        );
    }
    if converted > 0 {
        log::info!("Converted {} row(s) of text raw content to JSONB", converted);
    }

    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::fields::BASE_COLUMNS;

    /// First layout: base columns only, raw content as text, no updated_at.
    const LEGACY_TABLE_SQL: &str = "CREATE TABLE grail_files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticker TEXT,
        asset_type TEXT,
        file_path TEXT NOT NULL UNIQUE,
        content_hash TEXT NOT NULL UNIQUE,
        file_created_at TEXT,
        file_modified_at TEXT,
        raw_content TEXT NOT NULL,
        ingested_at TEXT NOT NULL
    )";

    fn legacy_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LEGACY_TABLE_SQL).unwrap();
        conn.execute(
            "INSERT INTO grail_files (ticker, asset_type, file_path, content_hash, raw_content, ingested_at)
             VALUES ('QQQ', 'OPTIONS', '/data/qqq.json', 'h1', ?1, '2024-01-01T00:00:00Z')",
            params![r#"{"ticker":"QQQ","asset_type":"OPTIONS","trade_plan":{"entry":{"current_price":0},"recommended_contract":{"strike":400}}}"#],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_create_table_sql_has_all_fields() {
        let sql = create_table_sql();
        for d in FIELDS {
            assert!(sql.contains(&format!(" {} ", d.column)), "missing {}", d.column);
        }
        assert!(sql.contains("file_path TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("content_hash TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn test_fresh_schema_then_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        let first = ensure_schema(&mut conn).unwrap();
        assert!(first.created_table);
        assert!(first.added_columns.is_empty());
        assert_eq!(first.created_indexes.len(), index_definitions().len());

        let second = ensure_schema(&mut conn).unwrap();
        assert!(second.is_noop(), "second run changed something: {:?}", second);
    }

    #[test]
    fn test_indexes_cover_filter_columns() {
        let names: Vec<String> = index_definitions().into_iter().map(|(n, _)| n).collect();
        for column in ["ticker", "asset_type", "ingested_at", "content_hash", "trade_action", "entry_direction", "option_expiration"] {
            assert!(names.contains(&format!("idx_grail_files_{column}")), "no index on {column}");
        }
    }

    #[test]
    fn test_legacy_table_migrated_and_backfilled() {
        let mut conn = legacy_conn();
        let report = ensure_schema(&mut conn).unwrap();

        assert!(!report.created_table);
        assert!(report.added_columns.contains(&"updated_at".to_string()));
        assert!(report.added_columns.contains(&"entry_price".to_string()));
        for base in BASE_COLUMNS {
            assert!(!report.added_columns.contains(&base.to_string()));
        }
        assert_eq!(report.converted_raw_rows, 1);
        let backfill = report.backfill.clone().unwrap();
        assert_eq!(backfill.scanned, 1);
        assert_eq!(backfill.updated, 1);
        assert_eq!(backfill.failed, 0);

        let (kind, entry_price, strike, updated_at): (String, Option<f64>, Option<f64>, Option<String>) = conn
            .query_row(
                "SELECT typeof(raw_content), entry_price, option_strike, updated_at FROM grail_files",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(kind, "blob");
        assert_eq!(entry_price, Some(0.0));
        assert_eq!(strike, Some(400.0));
        assert_eq!(updated_at.as_deref(), Some("2024-01-01T00:00:00Z"));

        // raw content stays queryable as structured data
        let ticker: String = conn
            .query_row("SELECT raw_content ->> '$.ticker' FROM grail_files", [], |r| r.get(0))
            .unwrap();
        assert_eq!(ticker, "QQQ");

        let again = ensure_schema(&mut conn).unwrap();
        assert!(again.is_noop(), "second run changed something: {:?}", again);
    }

    #[test]
    fn test_interrupted_backfill_resumes_on_next_start() {
        let mut conn = legacy_conn();
        conn.execute(
            "INSERT INTO grail_files (ticker, asset_type, file_path, content_hash, raw_content, ingested_at)
             VALUES ('AAPL', 'STOCK', '/data/aapl.json', 'h2', ?1, '2024-01-02T00:00:00Z')",
            params![r#"{"ticker":"AAPL","status":"success"}"#],
        )
        .unwrap();

        // columns committed, process killed before the backfill ran
        let partial = apply_additive_changes(&mut conn).unwrap();
        assert!(partial.added_columns.contains(&"status".to_string()));
        assert!(backfill_pending(&conn).unwrap());
        let unfilled: i64 = conn
            .query_row("SELECT COUNT(*) FROM grail_files WHERE entry_price IS NULL AND status IS NULL", [], |r| r.get(0))
            .unwrap();
        assert_eq!(unfilled, 2);

        let report = ensure_schema(&mut conn).unwrap();
        assert!(report.added_columns.is_empty());
        let backfill = report.backfill.unwrap();
        assert_eq!(backfill.scanned, 2);
        assert_eq!(backfill.updated, 2);
        assert!(!backfill_pending(&conn).unwrap());

        let status: Option<String> = conn
            .query_row("SELECT status FROM grail_files WHERE file_path = '/data/aapl.json'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status.as_deref(), Some("success"));
        let entry_price: Option<f64> = conn
            .query_row("SELECT entry_price FROM grail_files WHERE file_path = '/data/qqq.json'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(entry_price, Some(0.0));

        let again = ensure_schema(&mut conn).unwrap();
        assert!(again.is_noop(), "second run changed something: {:?}", again);
    }

    #[test]
    fn test_duplicate_legacy_contents_named_in_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE grail_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT,
                asset_type TEXT,
                file_path TEXT NOT NULL UNIQUE,
                file_created_at TEXT,
                file_modified_at TEXT,
                raw_content TEXT NOT NULL,
                ingested_at TEXT NOT NULL
            );
            INSERT INTO grail_files (file_path, raw_content, ingested_at)
            VALUES ('/a.json', '{}', 't0'), ('/copy/a.json', '{}', 't0'), ('/b.json', '[]', 't0');",
        )
        .unwrap();

        let err = ensure_schema(&mut conn).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, GrailError::Config(_)));
        assert!(message.contains(&fingerprint(b"{}")), "{message}");
        assert!(message.contains("/a.json, /copy/a.json") || message.contains("/copy/a.json, /a.json"), "{message}");
        assert!(!message.contains(&fingerprint(b"[]")), "{message}");

        // the failed migration rolled back as a whole
        assert!(!table_columns(&conn).unwrap().contains("content_hash"));
    }

    #[test]
    fn test_missing_content_hash_is_added() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE grail_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT,
                asset_type TEXT,
                file_path TEXT NOT NULL UNIQUE,
                file_created_at TEXT,
                file_modified_at TEXT,
                raw_content TEXT NOT NULL,
                ingested_at TEXT NOT NULL
            );
            INSERT INTO grail_files (file_path, raw_content, ingested_at)
            VALUES ('/a.json', '{\"ticker\": \"A\"}', '2024-01-01T00:00:00Z');",
        )
        .unwrap();

        let report = ensure_schema(&mut conn).unwrap();
        assert_eq!(report.hashed_rows, 1);

        let hash: String = conn
            .query_row("SELECT content_hash FROM grail_files", [], |r| r.get(0))
            .unwrap();
        assert_eq!(hash, fingerprint(b"{\"ticker\": \"A\"}"));

        let dup = conn.execute(
            "INSERT INTO grail_files (file_path, content_hash, raw_content, ingested_at) VALUES ('/b.json', ?1, jsonb('{}'), 'x')",
            params![hash],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_invalid_text_raw_content_left_alone() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LEGACY_TABLE_SQL).unwrap();
        conn.execute(
            "INSERT INTO grail_files (file_path, content_hash, raw_content, ingested_at)
             VALUES ('/bad.json', 'hb', 'not json', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let report = ensure_schema(&mut conn).unwrap();
        assert_eq!(report.converted_raw_rows, 0);
        let backfill = report.backfill.unwrap();
        assert_eq!(backfill.failed, 1);

        let status: Option<String> = conn
            .query_row("SELECT status FROM grail_files", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, None);
    }
}
