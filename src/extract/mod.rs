//! Field extraction: grail JSON document -> flat record of typed, nullable columns.
//!
//! Extraction is total. Missing paths, wrong-typed values and placeholder text
//! all resolve to NULL for the affected column only.

pub mod coerce;
pub mod fields;
pub mod lookup;

use serde_json::Value;

pub use coerce::{FieldKind, FieldValue};
pub use fields::{descriptor, FieldDescriptor, FieldGroup, Gate, FIELDS, OPTIONS_ASSET_TYPE};
pub use lookup::{lookup, lookup_present, lookup_str};

/// Extracted column values, aligned index-for-index with [`FIELDS`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord {
    values: Vec<FieldValue>,
}

impl ExtractedRecord {
    /// Value for `column`, or `None` if no such column is declared.
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        FIELDS
            .iter()
            .position(|d| d.column == column)
            .map(|idx| &self.values[idx])
    }

    /// Iterate `(descriptor, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static FieldDescriptor, &FieldValue)> {
        FIELDS.iter().zip(self.values.iter())
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        match self.get(column)? {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn decimal(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            FieldValue::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn boolean(&self, column: &str) -> Option<bool> {
        match self.get(column)? {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn ticker(&self) -> Option<&str> {
        self.text("ticker")
    }

    pub fn asset_type(&self) -> Option<&str> {
        self.text("asset_type")
    }
}

/// The document's own asset type hint (top-level `asset_type` string).
pub fn asset_type_of(doc: &Value) -> Option<&str> {
    lookup_str(doc, &["asset_type"])
}

/// Extract every declared column from `doc`.
///
/// `asset_type` drives gating of the options-contract group: unless it equals
/// [`OPTIONS_ASSET_TYPE`] those columns are NULL whatever the document holds.
pub fn extract(doc: &Value, asset_type: Option<&str>) -> ExtractedRecord {
    let values = FIELDS
        .iter()
        .map(|d| extract_field(doc, d, asset_type))
        .collect();
    ExtractedRecord { values }
}

/// Apply a single rule.
pub fn extract_field(doc: &Value, d: &FieldDescriptor, asset_type: Option<&str>) -> FieldValue {
    if !d.gate.allows(asset_type) {
        return FieldValue::Null;
    }
    coerce::coerce(lookup(doc, d.path), d.kind)
}
