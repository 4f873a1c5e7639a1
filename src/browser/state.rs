//! Browser state: directory listing, cursor, selection and status line.
//!
//! Nothing here touches the terminal.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::ingest::{validate_json_file, IngestSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

impl Status {
    pub fn new(level: StatusLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// One row of the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    /// For `.json` files: whether the content parses. `None` for everything else.
    pub valid_json: Option<bool>,
}

impl Entry {
    pub fn is_json(&self) -> bool {
        !self.is_dir && has_json_extension(&self.path)
    }
}

fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Directories first, then files, each sorted by name; hidden entries skipped.
pub fn read_entries(dir: &Path) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for item in std::fs::read_dir(dir)? {
        let item = item?;
        let name = item.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let path = item.path();
        let is_dir = path.is_dir();
        let valid_json = (!is_dir && has_json_extension(&path)).then(|| validate_json_file(&path));
        entries.push(Entry {
            name,
            path,
            is_dir,
            valid_json,
        });
    }
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

#[derive(Debug, Clone)]
pub struct BrowserState {
    pub cwd: PathBuf,
    pub entries: Vec<Entry>,
    pub cursor: usize,
    pub selected: BTreeSet<PathBuf>,
    pub status: Status,
}

impl BrowserState {
    pub fn new(cwd: &Path) -> Result<Self> {
        let cwd = std::fs::canonicalize(cwd)?;
        let entries = read_entries(&cwd)?;
        let mut state = Self {
            cwd,
            entries,
            cursor: 0,
            selected: BTreeSet::new(),
            status: Status::new(StatusLevel::Info, ""),
        };
        state.show_selection_count();
        Ok(state)
    }

    pub fn current(&self) -> Option<&Entry> {
        self.entries.get(self.cursor)
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
        }
    }

    /// Descend into the directory under the cursor; on a file, toggle it.
    pub fn open(&mut self) {
        match self.current() {
            Some(entry) if entry.is_dir => {
                let target = entry.path.clone();
                self.change_dir(target, None);
            }
            Some(_) => self.toggle_selected(),
            None => {}
        }
    }

    /// Go to the parent directory, keeping the cursor on the directory we left.
    pub fn parent(&mut self) {
        let Some(parent) = self.cwd.parent().map(Path::to_path_buf) else {
            return;
        };
        let came_from = self.cwd.clone();
        self.change_dir(parent, Some(came_from));
    }

    fn change_dir(&mut self, dir: PathBuf, focus: Option<PathBuf>) {
        match read_entries(&dir) {
            Ok(entries) => {
                self.cursor = focus
                    .and_then(|f| entries.iter().position(|e| e.path == f))
                    .unwrap_or(0);
                self.entries = entries;
                self.cwd = dir;
                self.show_selection_count();
            }
            Err(e) => {
                self.status = Status::new(
                    StatusLevel::Error,
                    format!("Cannot open {}: {}", dir.display(), e),
                );
            }
        }
    }

    /// Toggle selection of the `.json` file under the cursor.
    pub fn toggle_selected(&mut self) {
        let Some(entry) = self.current().cloned() else {
            return;
        };
        if !entry.is_json() {
            self.status = Status::new(StatusLevel::Warning, "Skipped: Only JSON files can be selected");
            return;
        }

        if self.selected.remove(&entry.path) {
            self.status = Status::new(StatusLevel::Info, format!("Deselected: {}", entry.name));
        } else {
            self.selected.insert(entry.path.clone());
            self.status = if entry.valid_json == Some(false) {
                Status::new(
                    StatusLevel::Warning,
                    format!("Selected: {} (not valid JSON, will be reported as an error)", entry.name),
                )
            } else {
                Status::new(StatusLevel::Info, format!("Selected: {}", entry.name))
            };
        }
    }

    pub fn is_selected(&self, path: &Path) -> bool {
        self.selected.contains(path)
    }

    /// Paths to ingest, or `None` (with a warning) when nothing is selected.
    pub fn selection_for_ingest(&mut self) -> Option<Vec<PathBuf>> {
        if self.selected.is_empty() {
            self.status = Status::new(
                StatusLevel::Warning,
                "No files selected. Navigate and press Space to select JSON files.",
            );
            return None;
        }
        self.status = Status::new(
            StatusLevel::Info,
            format!("Ingesting {} file(s)...", self.selected.len()),
        );
        Some(self.selected.iter().cloned().collect())
    }

    /// Clear the selection and report the batch result.
    pub fn finish_ingest(&mut self, summary: &IngestSummary) {
        self.selected.clear();
        let level = if summary.errors == 0 {
            StatusLevel::Success
        } else {
            StatusLevel::Warning
        };
        self.status = Status::new(
            level,
            format!(
                "Complete: {} inserted, {} updated, {} duplicates, {} errors",
                summary.inserted, summary.updated, summary.skipped, summary.errors
            ),
        );
    }

    /// Fatal failure of an ingest run; the selection is kept for a retry.
    pub fn ingest_failed(&mut self, message: impl std::fmt::Display) {
        self.status = Status::new(StatusLevel::Error, format!("Database error: {}", message));
    }

    fn show_selection_count(&mut self) {
        self.status = Status::new(
            StatusLevel::Info,
            format!("Selected: {} file(s)", self.selected.len()),
        );
    }
}
