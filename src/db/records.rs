//! Read-side helpers over `grail_files`.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};

use super::schema::TABLE;
use crate::error::Result;
use crate::extract::FIELDS;

/// A stored record as read back from the store
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: i64,
    pub file_path: String,
    pub content_hash: String,
    /// Raw document rendered back to JSON text
    pub raw_json: String,
    /// Extracted columns in table order
    pub columns: Vec<(&'static str, SqlValue)>,
    pub file_created_at: Option<String>,
    pub file_modified_at: Option<String>,
    pub ingested_at: String,
    pub updated_at: Option<String>,
}

impl StoredDocument {
    /// Stored value of an extracted column.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    /// Parsed raw document.
    pub fn raw(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.raw_json)?)
    }
}

/// Number of live records.
pub fn count_documents(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| row.get(0))?;
    Ok(count as usize)
}

/// Whether a record exists for `file_path`.
pub fn document_exists(conn: &Connection, file_path: &str) -> Result<bool> {
    let found = conn
        .query_row(
            &format!("SELECT 1 FROM {TABLE} WHERE file_path = ?1"),
            params![file_path],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Fetch the full record stored for `file_path`.
pub fn get_document(conn: &Connection, file_path: &str) -> Result<Option<StoredDocument>> {
    let column_list = FIELDS.iter().map(|d| d.column).collect::<Vec<_>>().join(", ");
    let sql = format!(
        "SELECT id, file_path, content_hash, json(raw_content), file_created_at, \
         file_modified_at, ingested_at, updated_at, {column_list} \
         FROM {TABLE} WHERE file_path = ?1"
    );
    const FIXED: usize = 8;

    let doc = conn
        .query_row(&sql, params![file_path], |row| {
            let columns = FIELDS
                .iter()
                .enumerate()
                .map(|(i, d)| row.get::<_, SqlValue>(FIXED + i).map(|v| (d.column, v)))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(StoredDocument {
                id: row.get(0)?,
                file_path: row.get(1)?,
                content_hash: row.get(2)?,
                raw_json: row.get(3)?,
                file_created_at: row.get(4)?,
                file_modified_at: row.get(5)?,
                ingested_at: row.get(6)?,
                updated_at: row.get(7)?,
                columns,
            })
        })
        .optional()?;
    Ok(doc)
}
