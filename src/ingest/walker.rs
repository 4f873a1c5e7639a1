use globset::{GlobBuilder, GlobMatcher};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{GrailError, Result};

/// Characters that make a command-line argument a glob pattern
const GLOB_META: &[char] = &['*', '?', '['];

/// Expand command-line arguments into the ordered list of files to ingest.
///
/// - an existing file is taken as-is
/// - a directory contributes its `*.json` files, sorted (walked fully when
///   `recursive`, otherwise only its direct children)
/// - a glob pattern is matched against a walk of its literal base directory
///
/// Arguments that yield nothing are passed through unchanged so the
/// ingestion step reports them as per-path errors instead of dropping them.
pub fn expand_inputs(args: &[String], recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for arg in args {
        let path = Path::new(arg);
        let expanded = if path.is_file() {
            vec![path.to_path_buf()]
        } else if path.is_dir() {
            discover_json_files(path, recursive)
        } else if is_glob(arg) {
            expand_glob(arg).unwrap_or_else(|e| {
                log::warn!("Bad pattern {}: {}", arg, e);
                Vec::new()
            })
        } else {
            Vec::new()
        };

        if expanded.is_empty() {
            log::debug!("{} matched no files", arg);
            files.push(path.to_path_buf());
        } else {
            files.extend(expanded);
        }
    }

    log::info!("Resolved {} argument(s) to {} path(s)", args.len(), files.len());
    files
}

pub fn is_glob(arg: &str) -> bool {
    arg.contains(GLOB_META)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// All `*.json` files under `root`, sorted by path.
pub fn discover_json_files(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(root).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_json(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Split a pattern into the literal directory prefix and the glob remainder.
fn split_pattern(pattern: &str) -> (PathBuf, String) {
    let mut base = PathBuf::new();
    let mut rest = Vec::new();

    for component in Path::new(pattern).components() {
        let text = component.as_os_str().to_string_lossy();
        if rest.is_empty() && !text.contains(GLOB_META) {
            base.push(component);
        } else if !matches!(component, Component::RootDir) {
            rest.push(text.to_string());
        }
    }

    if base.as_os_str().is_empty() {
        base.push(".");
    }
    (base, rest.join("/"))
}

fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let (base, rest) = split_pattern(pattern);
    let matcher: GlobMatcher = GlobBuilder::new(&rest)
        .literal_separator(true)
        .build()
        .map_err(|e| GrailError::InvalidInput(e.to_string()))?
        .compile_matcher();

    let mut files: Vec<PathBuf> = WalkDir::new(&base)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .strip_prefix(&base)
                .map(|rel| matcher.is_match(rel))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}
