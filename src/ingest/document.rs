use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::identity::fingerprint;
use crate::error::{GrailError, Result};

/// A grail file read from disk, parsed and fingerprinted
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Canonical absolute path, the record's location key
    pub path: PathBuf,
    /// Exact file text as stored in `raw_content`
    pub raw: String,
    pub digest: String,
    pub parsed: Value,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl LoadedDocument {
    /// Read and parse `path`.
    ///
    /// Unreadable files, non UTF-8 bytes and malformed JSON are all errors for
    /// this one file.
    pub fn load(path: &Path) -> Result<Self> {
        let path = std::fs::canonicalize(path)?;
        let metadata = std::fs::metadata(&path)?;
        if !metadata.is_file() {
            return Err(GrailError::InvalidInput(format!(
                "Not a file: {}",
                path.display()
            )));
        }

        let bytes = std::fs::read(&path)?;
        let digest = fingerprint(&bytes);
        let raw = String::from_utf8(bytes)
            .map_err(|e| GrailError::Parse(format!("file is not valid UTF-8: {}", e)))?;
        let parsed: Value = serde_json::from_str(&raw)?;

        // timestamps are best effort; some filesystems report no birth time
        let created_at = metadata.created().ok().map(to_utc);
        let modified_at = metadata.modified().ok().map(to_utc);

        Ok(Self {
            path,
            raw,
            digest,
            parsed,
            created_at,
            modified_at,
        })
    }

    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// True iff `path` is a readable file holding syntactically valid JSON.
pub fn validate_json_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    match std::fs::read_to_string(path) {
        Ok(text) => serde_json::from_str::<serde::de::IgnoredAny>(&text).is_ok(),
        Err(_) => false,
    }
}
