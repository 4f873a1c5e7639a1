//! Recompute extracted columns for rows already in the store.
//!
//! Each row is read, re-extracted and written back on its own, keyed by id,
//! and only when a value differs. A killed run can simply be started again.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};

use super::schema::TABLE;
use crate::error::{GrailError, Result};
use crate::extract::{asset_type_of, extract, ExtractedRecord, FIELDS};

/// Outcome of one backfill pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub scanned: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Re-run extraction over every stored record.
pub fn backfill(conn: &Connection) -> Result<BackfillReport> {
    let ids: Vec<i64> = {
        let mut stmt = conn.prepare(&format!("SELECT id FROM {TABLE} ORDER BY id"))?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        ids
    };

    let mut report = BackfillReport::default();
    for id in ids {
        report.scanned += 1;
        match backfill_row(conn, id) {
            Ok(true) => report.updated += 1,
            Ok(false) => {}
            Err(e) => {
                report.failed += 1;
                log::warn!("Backfill skipped {} id={}: {}", TABLE, id, e);
            }
        }
    }

    log::info!(
        "Backfill complete: scanned={}, updated={}, failed={}",
        report.scanned,
        report.updated,
        report.failed
    );
    Ok(report)
}

/// Backfill a single row; returns whether anything was written.
fn backfill_row(conn: &Connection, id: i64) -> Result<bool> {
    let column_list = FIELDS.iter().map(|d| d.column).collect::<Vec<_>>().join(", ");
    let select = format!(
        "SELECT CASE WHEN typeof(raw_content) = 'blob' OR json_valid(raw_content) \
         THEN json(raw_content) END, {column_list} FROM {TABLE} WHERE id = ?1"
    );

    let row: Option<(Option<String>, Vec<SqlValue>)> = conn
        .query_row(&select, params![id], |row| {
            let raw: Option<String> = row.get(0)?;
            let stored = (0..FIELDS.len())
                .map(|i| row.get::<_, SqlValue>(i + 1))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((raw, stored))
        })
        .optional()?;

    // row deleted since the id scan
    let Some((raw, stored)) = row else {
        return Ok(false);
    };

    let raw = raw.ok_or_else(|| GrailError::Parse("raw content is not valid JSON".to_string()))?;
    let doc: serde_json::Value = serde_json::from_str(&raw)?;

    let stored_asset_type = FIELDS
        .iter()
        .position(|d| d.column == "asset_type")
        .and_then(|i| match &stored[i] {
            SqlValue::Text(s) => Some(s.clone()),
            _ => None,
        });
    let hint = stored_asset_type.as_deref().or_else(|| asset_type_of(&doc));
    let record = extract(&doc, hint);

    if !differs(&record, &stored) {
        return Ok(false);
    }

    write_fields(conn, id, &record)?;
    Ok(true)
}

fn differs(record: &ExtractedRecord, stored: &[SqlValue]) -> bool {
    record
        .values()
        .iter()
        .zip(stored)
        .any(|(fresh, old)| fresh.to_sql_value() != *old)
}

fn write_fields(conn: &Connection, id: i64, record: &ExtractedRecord) -> Result<()> {
    let assignments = FIELDS
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{} = ?{}", d.column, i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {TABLE} SET {assignments} WHERE id = ?{}",
        FIELDS.len() + 1
    );

    let mut values: Vec<&dyn ToSql> = record.values().iter().map(|v| v as &dyn ToSql).collect();
    values.push(&id);
    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}
