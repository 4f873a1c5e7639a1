//! Declarative catalogue of extracted columns.
//!
//! Each entry maps one column of `grail_files` to a path inside the grail JSON
//! document and a declared kind. Adding a column means adding a row here; the
//! schema manager picks it up as an additive migration.

use super::coerce::FieldKind;

/// `asset_type` value that enables the options-contract group
pub const OPTIONS_ASSET_TYPE: &str = "OPTIONS";

/// Logical grouping of extracted columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    Core,
    Decision,
    Entry,
    Position,
    Market,
    Usage,
    Resolution,
    Agents,
    Options,
}

/// Condition under which a field is extracted at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Always,
    /// Only when the asset type is [`OPTIONS_ASSET_TYPE`]; forced NULL otherwise
    OptionsOnly,
}

impl Gate {
    pub fn allows(&self, asset_type: Option<&str>) -> bool {
        match self {
            Gate::Always => true,
            Gate::OptionsOnly => asset_type == Some(OPTIONS_ASSET_TYPE),
        }
    }
}

/// One extraction rule
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub column: &'static str,
    pub path: &'static [&'static str],
    pub kind: FieldKind,
    pub group: FieldGroup,
    pub gate: Gate,
    /// Whether the column is indexed for filtering
    pub indexed: bool,
}

const fn field(
    column: &'static str,
    path: &'static [&'static str],
    kind: FieldKind,
    group: FieldGroup,
) -> FieldDescriptor {
    FieldDescriptor {
        column,
        path,
        kind,
        group,
        gate: Gate::Always,
        indexed: false,
    }
}

const fn indexed(mut d: FieldDescriptor) -> FieldDescriptor {
    d.indexed = true;
    d
}

const fn options(
    column: &'static str,
    path: &'static [&'static str],
    kind: FieldKind,
) -> FieldDescriptor {
    FieldDescriptor {
        column,
        path,
        kind,
        group: FieldGroup::Options,
        gate: Gate::OptionsOnly,
        indexed: false,
    }
}

use FieldGroup::*;
use FieldKind::{Bool, ConfidencePct, Date, Integer, Text};

const PRICE: FieldKind = FieldKind::Decimal { scale: 4 };
const MONEY: FieldKind = FieldKind::Decimal { scale: 2 };
const PERCENT: FieldKind = FieldKind::Decimal { scale: 4 };

/// Every extracted column, in table order
pub static FIELDS: &[FieldDescriptor] = &[
    // status / core
    indexed(field("ticker", &["ticker"], Text, Core)),
    indexed(field("asset_type", &["asset_type"], Text, Core)),
    indexed(field("status", &["status"], Text, Core)),
    field("error_message", &["error"], Text, Core),
    field("trade_style", &["trade_style"], Text, Core),
    field("account_size", &["account_size"], MONEY, Core),
    field("risk_percent", &["risk_percent"], PERCENT, Core),
    // trading decision
    indexed(field("should_trade", &["trade_plan", "trade"], Bool, Decision)),
    indexed(field("trade_action", &["trade_plan", "verdict", "action"], Text, Decision)),
    field("trade_confidence_text", &["trade_plan", "verdict", "confidence"], Text, Decision),
    indexed(field("trade_confidence_pct", &["trade_plan", "verdict", "confidence"], ConfidencePct, Decision)),
    field("no_trade_reason", &["trade_plan", "no_trade_reason"], Text, Decision),
    // entry
    indexed(field("entry_direction", &["trade_plan", "entry", "direction"], Text, Entry)),
    field("entry_price", &["trade_plan", "entry", "current_price"], PRICE, Entry),
    field("entry_recommendation", &["trade_plan", "entry", "recommendation"], Text, Entry),
    // position sizing
    field("position_quantity", &["trade_plan", "position", "quantity"], Integer, Position),
    field("position_unit_type", &["trade_plan", "position", "unit_type"], Text, Position),
    field("position_size_recommendation", &["trade_plan", "position", "size_recommendation"], Text, Position),
    field("position_total_cost_text", &["trade_plan", "position", "total_cost"], Text, Position),
    field("position_max_risk_text", &["trade_plan", "position", "max_risk"], Text, Position),
    // market context
    field("market_status", &["market_session", "status"], Text, Market),
    indexed(field("is_tradeable_now", &["market_session", "is_tradeable_now"], Bool, Market)),
    field("in_trial", &["in_trial"], Bool, Market),
    // API usage
    field("runs_remaining", &["runs_remaining"], Integer, Usage),
    field("daily_runs_remaining", &["daily_runs_remaining"], Integer, Usage),
    // ticker resolution
    field("resolved_ticker", &["resolved_ticker"], Text, Resolution),
    field("resolved_ticker_method", &["resolved_ticker_method"], Text, Resolution),
    // agent confidence
    field("technical_confidence", &["agent_verdicts", "technical", "confidence"], MONEY, Agents),
    field("macro_confidence", &["agent_verdicts", "macro", "confidence"], MONEY, Agents),
    field("wild_card_risk", &["trade_plan", "synthesis", "wild_card_risk"], Text, Agents),
    field("agent_agreement", &["trade_plan", "synthesis", "agent_agreement"], Text, Agents),
    // options contract
    indexed(options("option_contract_symbol", &["trade_plan", "recommended_contract", "symbol"], Text)),
    indexed(options("option_type", &["trade_plan", "recommended_contract", "type"], Text)),
    options("option_strike", &["trade_plan", "recommended_contract", "strike"], PRICE),
    indexed(options("option_expiration", &["trade_plan", "recommended_contract", "expiration"], Date)),
    options("option_days_to_expiry", &["trade_plan", "recommended_contract", "days_to_expiration"], Integer),
    options("option_delta", &["trade_plan", "recommended_contract", "delta"], PRICE),
    options("option_mid_price", &["trade_plan", "recommended_contract", "mid_price"], PRICE),
    options("option_volume", &["trade_plan", "recommended_contract", "volume"], Integer),
    options("option_open_interest", &["trade_plan", "recommended_contract", "open_interest"], Integer),
];

/// Columns present since the first store layout; everything else is added by migration
pub const BASE_COLUMNS: &[&str] = &["ticker", "asset_type"];

/// Look up a descriptor by column name
pub fn descriptor(column: &str) -> Option<&'static FieldDescriptor> {
    FIELDS.iter().find(|d| d.column == column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_columns_unique_and_paths_nonempty() {
        let mut seen = HashSet::new();
        for d in FIELDS {
            assert!(seen.insert(d.column), "duplicate column {}", d.column);
            assert!(!d.path.is_empty(), "empty path for {}", d.column);
        }
    }

    #[test]
    fn test_options_group_is_gated() {
        for d in FIELDS {
            assert_eq!(
                d.group == FieldGroup::Options,
                d.gate == Gate::OptionsOnly,
                "gate mismatch for {}",
                d.column
            );
        }
        assert_eq!(FIELDS.iter().filter(|d| d.group == FieldGroup::Options).count(), 9);
    }

    #[test]
    fn test_gate_is_exact_match() {
        assert!(Gate::OptionsOnly.allows(Some("OPTIONS")));
        assert!(!Gate::OptionsOnly.allows(Some("options")));
        assert!(!Gate::OptionsOnly.allows(Some("STOCK")));
        assert!(!Gate::OptionsOnly.allows(None));
        assert!(Gate::Always.allows(None));
    }

    #[test]
    fn test_descriptor_lookup() {
        let d = descriptor("entry_price").unwrap();
        assert_eq!(d.path, &["trade_plan", "entry", "current_price"]);
        assert!(descriptor("missing_column").is_none());
    }
}
