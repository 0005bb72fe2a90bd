// 🧹 Transaction Normalizer - raw row + account → ProcessedTransaction
// Strict two-way action (ost → Buy, everything else → Sell); numbers never fail, they become 0.0
// Complete rows are always kept, even when the trade date text cannot be read

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::classifier::SymbolClassifier;
use crate::parser::RawRow;
use crate::symbols::{normalize_symbol, AssetType};

// ============================================================================
// ACTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "Buy",
            Action::Sell => "Sell",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Estonian transaction kind → action. Only "ost" (buy) is Buy.
pub fn infer_action(kind: Option<&str>) -> Action {
    match kind.map(|k| k.trim().to_lowercase()) {
        Some(k) if k == "ost" => Action::Buy,
        _ => Action::Sell,
    }
}

// ============================================================================
// FIELD COERCION
// ============================================================================

/// Never fails: empty, non-numeric and non-finite input all give 0.0.
/// Accepts comma decimals ("123,45") and space or no-break-space grouping ("-1 234,50").
/// With both ',' and '.' present the later one is the decimal mark.
pub fn parse_numeric(input: Option<&str>) -> f64 {
    input
        .map(canonical_number)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn canonical_number(input: &str) -> String {
    let compact: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\u{a0}' | '\u{202f}' | '\''))
        .collect();

    match (compact.rfind(','), compact.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(_), None) if compact.matches(',').count() == 1 => compact.replace(',', "."),
        (Some(_), None) => compact.replace(',', ""),
        _ => compact,
    }
}

// Slashes are month first ("02/10/2021" is 10 February); dots are day first.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d.%m.%Y",
    "%m/%d/%Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %b %Y",
];

fn parse_date_only(input: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
}

/// Statement trade dates in the numeric and month-name forms brokers export.
/// A trailing time part ("2021-02-10T00:00:00", "10.02.2021 09:30") is ignored.
pub fn parse_trade_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    parse_date_only(trimmed).or_else(|| {
        let (date_part, _) = trimmed.split_once(|c: char| c == 'T' || c.is_whitespace())?;
        parse_date_only(date_part)
    })
}

fn text(field: &Option<String>) -> String {
    field.as_deref().map(str::trim).unwrap_or("").to_string()
}

// ============================================================================
// PROCESSED TRANSACTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTransaction {
    /// None when the trade date text could not be read; the row is kept anyway
    pub date: Option<NaiveDate>,
    /// Trade date as written in the statement
    #[serde(default)]
    pub date_text: String,
    pub account: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub action: Action,
    pub symbol: String,
    pub name: String,
    pub currency: String,
    pub amount: f64,
    pub price: f64,
    pub cost: f64,
    pub fee: f64,
    /// Broker reference (VIIDE); only used to spot duplicate exports
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reference: String,
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub transactions: Vec<ProcessedTransaction>,
    /// Rows without a trade date or symbol
    pub incomplete: usize,
    /// Kept rows whose trade date could not be read
    pub unparsed_dates: usize,
}

impl ProcessedTransaction {
    /// Trade date for display: dd.mm.yyyy when read, the statement text otherwise
    pub fn display_date(&self) -> String {
        match self.date {
            Some(date) => date.format("%d.%m.%Y").to_string(),
            None => self.date_text.clone(),
        }
    }
}

/// Normalize one row. None only when the row has no trade date or no symbol.
pub fn normalize_row(
    row: &RawRow,
    account: &str,
    classifier: &SymbolClassifier,
) -> Option<ProcessedTransaction> {
    if !row.is_complete() {
        return None;
    }

    let date_text = text(&row.trade_date);
    let symbol = normalize_symbol(row.symbol.as_deref().unwrap_or(""));

    Some(ProcessedTransaction {
        date: parse_trade_date(&date_text),
        date_text,
        account: account.to_string(),
        asset_type: classifier.type_for(&symbol),
        action: infer_action(row.kind.as_deref()),
        name: text(&row.security_name),
        currency: text(&row.currency),
        amount: parse_numeric(row.quantity.as_deref()),
        price: parse_numeric(row.price.as_deref()),
        cost: parse_numeric(row.net_amount.as_deref()),
        fee: parse_numeric(row.fee.as_deref()),
        reference: text(&row.reference),
        symbol,
    })
}

pub fn normalize_with_stats(
    rows: &[RawRow],
    account: &str,
    classifier: &SymbolClassifier,
) -> Normalized {
    let mut out = Normalized::default();

    for row in rows {
        if !row.is_complete() {
            out.incomplete += 1;
            continue;
        }

        if let Some(tx) = normalize_row(row, account, classifier) {
            if tx.date.is_none() {
                warn!(
                    account,
                    trade_date = tx.date_text.as_str(),
                    symbol = tx.symbol.as_str(),
                    "Keeping row with unreadable trade date"
                );
                out.unparsed_dates += 1;
            }
            out.transactions.push(tx);
        }
    }

    out
}

pub fn normalize(
    rows: &[RawRow],
    account: &str,
    classifier: &SymbolClassifier,
) -> Vec<ProcessedTransaction> {
    normalize_with_stats(rows, account, classifier).transactions
}

// ============================================================================
// TESTS
// ============================================================================
