//! Optional nested lookup into untyped JSON documents.
//!
//! Every extraction rule goes through [`lookup`]; a missing key or a non-object
//! node at any step yields `None` instead of an error.

use serde_json::Value;

/// Follow `path` through nested objects, returning `None` at the first missing step.
///
/// An empty path returns the document itself.
pub fn lookup<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(doc, |node, key| node.as_object()?.get(*key))
}

/// Like [`lookup`] but treats an explicit JSON `null` as absent.
pub fn lookup_present<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    lookup(doc, path).filter(|v| !v.is_null())
}

/// Convenience for string-valued paths.
pub fn lookup_str<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a str> {
    lookup(doc, path).and_then(Value::as_str)
}
