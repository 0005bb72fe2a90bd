// 📤 Exporter - ledger → single-sheet xlsx workbook
// Numbers go out as locale-formatted text, dates as real spreadsheet dates.
// Every export is a new file: an existing workbook is never touched.

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use rust_xlsxwriter::{Format, Workbook};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::batch::Ledger;
use crate::config::{DateEncoding, DecimalSeparator, ExportConfig};
use crate::normalizer::ProcessedTransaction;

pub const SHEET_NAME: &str = "Combined Transactions";

pub const HEADER: [&str; 11] = [
    "Date", "Account", "Type", "Action", "Symbol", "Name", "Currency", "Amount", "Price", "Cost",
    "Fee",
];

pub const AMOUNT_DECIMALS: usize = 6;
pub const PRICE_DECIMALS: usize = 4;
pub const MONEY_DECIMALS: usize = 2;

const DATE_FORMAT: &str = "dd.mm.yyyy";

// ============================================================================
// NUMBER / DATE FORMATTING
// ============================================================================

impl DecimalSeparator {
    fn decimal_char(&self) -> char {
        match self {
            DecimalSeparator::Comma => ',',
            DecimalSeparator::Period => '.',
        }
    }

    fn group_char(&self) -> char {
        match self {
            DecimalSeparator::Comma => '\u{a0}',
            DecimalSeparator::Period => ',',
        }
    }
}

/// Fixed-precision number with thousands grouping.
/// `format_decimal(-1234.5, 2, Comma)` → "-1 234,50" (no-break space).
pub fn format_decimal(value: f64, decimals: usize, separator: DecimalSeparator) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(fixed.len() + int_part.len() / 3 + 1);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(separator.group_char());
        }
        grouped.push(digit);
    }
    if let Some(frac) = frac_part {
        grouped.push(separator.decimal_char());
        grouped.push_str(frac);
    }

    // "-0,00" reads as noise
    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    if value < 0.0 && !is_zero {
        grouped.insert(0, '-');
    }
    grouped
}

/// Inverse of `format_decimal`
pub fn parse_localized(text: &str, separator: DecimalSeparator) -> Option<f64> {
    let group = separator.group_char();
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != group && *c != ' ')
        .map(|c| if c == separator.decimal_char() { '.' } else { c })
        .collect();
    cleaned.parse().ok()
}

/// Days since the spreadsheet epoch: 2021-02-10 → 44237.
/// 1899-12-30 folds in the 1900 leap-year quirk for every date after February 1900.
pub fn excel_serial(date: NaiveDate) -> i64 {
    // Days from 0001-01-01 (CE day 1) to 1899-12-30
    const EPOCH_FROM_CE: i64 = 693_594;
    date.num_days_from_ce() as i64 - EPOCH_FROM_CE
}

pub fn date_formula(date: NaiveDate) -> String {
    format!("=DATE({},{},{})", date.year(), date.month(), date.day())
}

// ============================================================================
// GRID
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Date(NaiveDate),
}

/// One row of cells in header order. An unreadable trade date goes out as its text.
pub fn transaction_row(tx: &ProcessedTransaction, separator: DecimalSeparator) -> Vec<CellValue> {
    let date = match tx.date {
        Some(date) => CellValue::Date(date),
        None => CellValue::Text(tx.date_text.clone()),
    };

    vec![
        date,
        CellValue::Text(tx.account.clone()),
        CellValue::Text(tx.asset_type.to_string()),
        CellValue::Text(tx.action.to_string()),
        CellValue::Text(tx.symbol.clone()),
        CellValue::Text(tx.name.clone()),
        CellValue::Text(tx.currency.clone()),
        CellValue::Text(format_decimal(tx.amount, AMOUNT_DECIMALS, separator)),
        CellValue::Text(format_decimal(tx.price, PRICE_DECIMALS, separator)),
        CellValue::Text(format_decimal(tx.cost, MONEY_DECIMALS, separator)),
        CellValue::Text(format_decimal(tx.fee, MONEY_DECIMALS, separator)),
    ]
}

pub fn build_rows(
    transactions: &[ProcessedTransaction],
    separator: DecimalSeparator,
) -> Vec<Vec<CellValue>> {
    transactions
        .iter()
        .map(|tx| transaction_row(tx, separator))
        .collect()
}

// ============================================================================
// WORKBOOK
// ============================================================================

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub decimal_separator: DecimalSeparator,
    pub date_encoding: DateEncoding,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions::from(&ExportConfig::default())
    }
}

impl From<&ExportConfig> for ExportOptions {
    fn from(config: &ExportConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            file_prefix: config.file_prefix.clone(),
            decimal_separator: config.decimal_separator,
            date_encoding: config.date_encoding,
        }
    }
}

/// Serialize the ledger into xlsx bytes
pub fn render_workbook(
    transactions: &[ProcessedTransaction],
    options: &ExportOptions,
) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format(DATE_FORMAT);

    let sheet = workbook.add_worksheet();
    sheet
        .set_name(SHEET_NAME)
        .context("Failed to name worksheet")?;

    for (col, title) in HEADER.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, *title, &header_format)
            .context("Failed to write header")?;
    }
    sheet.set_freeze_panes(1, 0).context("Failed to freeze header row")?;
    sheet.set_column_width(0, 12).context("Failed to size date column")?;
    sheet.set_column_width(5, 32).context("Failed to size name column")?;

    for (i, cells) in build_rows(transactions, options.decimal_separator)
        .into_iter()
        .enumerate()
    {
        let row = (i + 1) as u32;
        for (col, cell) in cells.into_iter().enumerate() {
            let col = col as u16;
            match (cell, options.date_encoding) {
                (CellValue::Text(text), _) => {
                    sheet.write_string(row, col, text)?;
                }
                (CellValue::Date(date), DateEncoding::Serial) => {
                    sheet.write_number_with_format(row, col, excel_serial(date) as f64, &date_format)?;
                }
                (CellValue::Date(date), DateEncoding::Formula) => {
                    sheet.write_formula_with_format(row, col, date_formula(date).as_str(), &date_format)?;
                }
            }
        }
    }

    let bytes = workbook
        .save_to_buffer()
        .context("Failed to serialize workbook")?;
    debug!(rows = transactions.len(), bytes = bytes.len(), "Workbook rendered");
    Ok(bytes)
}

/// `<prefix>_<YYYYMMDD>.xlsx`, then `_2`, `_3`, ... for later exports on the same day
pub fn export_filename(prefix: &str, date: NaiveDate, attempt: u32) -> String {
    let stamp = date.format("%Y%m%d");
    if attempt <= 1 {
        format!("{}_{}.xlsx", prefix, stamp)
    } else {
        format!("{}_{}_{}.xlsx", prefix, stamp, attempt)
    }
}

/// Write bytes to the first free name. `create_new` keeps a concurrent
/// or earlier export from ever being overwritten.
fn write_fresh(dir: &Path, prefix: &str, date: NaiveDate, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {:?}", dir))?;

    let mut attempt = 1;
    loop {
        let path = dir.join(export_filename(prefix, date, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(bytes)
                    .with_context(|| format!("Failed to write workbook: {:?}", path))?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create workbook: {:?}", path));
            }
        }
    }
}

/// Export stamped with an explicit date
pub fn export_on(
    transactions: &[ProcessedTransaction],
    options: &ExportOptions,
    date: NaiveDate,
) -> Result<PathBuf> {
    let bytes = render_workbook(transactions, options)?;
    let path = write_fresh(&options.output_dir, &options.file_prefix, date, &bytes)?;
    info!(path = %path.display(), rows = transactions.len(), "Exported workbook");
    Ok(path)
}

/// Export stamped with today's local date
pub fn export(transactions: &[ProcessedTransaction], options: &ExportOptions) -> Result<PathBuf> {
    export_on(transactions, options, Local::now().date_naive())
}

/// Export a run's ledger. An empty ledger writes nothing and gives None.
pub fn export_ledger_on(
    ledger: &Ledger,
    options: &ExportOptions,
    date: NaiveDate,
) -> Result<Option<PathBuf>> {
    if ledger.is_empty() {
        info!(run_id = %ledger.run_id, "No transactions to export");
        return Ok(None);
    }
    export_on(&ledger.transactions, options, date).map(Some)
}

pub fn export_ledger(ledger: &Ledger, options: &ExportOptions) -> Result<Option<PathBuf>> {
    export_ledger_on(ledger, options, Local::now().date_naive())
}

// ============================================================================
// TESTS
// ============================================================================
