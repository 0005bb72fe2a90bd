// 🏗️ Parser - Estonian brokerage statement CSV → typed raw rows
// Column names are resolved once here; nothing downstream touches a header string

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ============================================================================
// RAW ROW
// ============================================================================

/// One statement line as exported (LHV-style headers).
/// Every field is optional: exports differ in which columns they carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(rename = "VÄÄRTUSPÄEV", default)]
    pub value_date: Option<String>,

    #[serde(rename = "TEHINGUPÄEV", default)]
    pub trade_date: Option<String>,

    /// Transaction kind: "ost" (buy), "müük" (sell), ...
    #[serde(rename = "TEHING", default)]
    pub kind: Option<String>,

    #[serde(rename = "SÜMBOL", default)]
    pub symbol: Option<String>,

    #[serde(rename = "VÄÄRTPABER", default)]
    pub security_name: Option<String>,

    #[serde(rename = "KOGUS", default)]
    pub quantity: Option<String>,

    #[serde(rename = "HIND", default)]
    pub price: Option<String>,

    #[serde(rename = "VALUUTA", default)]
    pub currency: Option<String>,

    #[serde(rename = "NETOSUMMA", default)]
    pub net_amount: Option<String>,

    #[serde(rename = "TEENUSTASU", default)]
    pub fee: Option<String>,

    #[serde(rename = "KOKKU", default)]
    pub total: Option<String>,

    #[serde(rename = "VIIDE", default)]
    pub reference: Option<String>,

    #[serde(rename = "KOMMENTAAR", default)]
    pub comment: Option<String>,
}

impl RawRow {
    /// A row needs both a trade date and a symbol to become a transaction
    pub fn is_complete(&self) -> bool {
        has_text(&self.trade_date) && has_text(&self.symbol)
    }
}

fn has_text(field: &Option<String>) -> bool {
    field.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

// ============================================================================
// SOURCE FILE
// ============================================================================

/// One input statement: a path on disk, or bytes already in memory
#[derive(Debug, Clone)]
pub enum SourceFile {
    Path(PathBuf),
    Memory { name: String, data: Vec<u8> },
}

impl SourceFile {
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        SourceFile::Path(path.into())
    }

    pub fn in_memory(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        SourceFile::Memory {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn file_name(&self) -> String {
        match self {
            SourceFile::Path(path) => path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown.csv")
                .to_string(),
            SourceFile::Memory { name, .. } => name.clone(),
        }
    }

    pub fn account(&self) -> String {
        account_from_filename(&self.file_name())
    }

    pub fn is_csv(&self) -> bool {
        self.file_name().to_lowercase().ends_with(".csv")
    }

    fn read_all(&self) -> Result<Vec<u8>> {
        match self {
            SourceFile::Path(path) => fs::read(path)
                .with_context(|| format!("Failed to open file: {}", path.display())),
            SourceFile::Memory { data, .. } => Ok(data.clone()),
        }
    }
}

/// "LHV_2025_Metallid.csv" → "LHV": drop the extension, keep what precedes the first '_'
pub fn account_from_filename(file_name: &str) -> String {
    let stem = match file_name.rfind('.') {
        Some(idx) => &file_name[..idx],
        None => file_name,
    };
    stem.split('_').next().unwrap_or("").to_string()
}

/// Expand CLI inputs: directories contribute their *.csv entries (name order),
/// anything that is not a .csv is skipped with a warning
pub fn collect_sources(inputs: &[PathBuf]) -> Result<Vec<SourceFile>> {
    let mut sources = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(input)
                .with_context(|| format!("Failed to read directory: {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file())
                .collect();
            entries.sort();

            for path in entries {
                let source = SourceFile::from_path(path);
                if source.is_csv() {
                    sources.push(source);
                }
            }
            continue;
        }

        let source = SourceFile::from_path(input.clone());
        if source.is_csv() {
            sources.push(source);
        } else {
            warn!(file = %input.display(), "Skipping non-CSV input");
        }
    }

    Ok(sources)
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse one source into raw rows. Any I/O or CSV error fails the whole file.
pub fn parse_source(source: &SourceFile) -> Result<Vec<RawRow>> {
    let data = source.read_all()?;
    let file_name = source.file_name();

    let rows = parse_reader(data.as_slice(), &file_name)?;
    debug!(file = %file_name, rows = rows.len(), "Parsed statement");

    Ok(rows)
}

/// Parse CSV from any reader; the delimiter is sniffed from the header line
pub fn parse_reader<R: Read>(mut reader: R, file_name: &str) -> Result<Vec<RawRow>> {
    let mut content = Vec::new();
    reader
        .read_to_end(&mut content)
        .with_context(|| format!("Failed to read {}", file_name))?;

    let delimiter = detect_delimiter(&content);

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_slice());

    let mut rows = Vec::new();
    for (line_num, result) in csv_reader.deserialize::<RawRow>().enumerate() {
        let row = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_num + 2, file_name)
        })?;
        rows.push(row);
    }

    Ok(rows)
}

/// Pick whichever of , ; TAB occurs most in the header line (comma on ties)
pub fn detect_delimiter(content: &[u8]) -> u8 {
    let header = content.split(|b| *b == b'\n').next().unwrap_or(&[]);

    [b',', b';', b'\t']
        .iter()
        .map(|d| (*d, header.iter().filter(|b| *b == d).count()))
        .fold((b',', 0), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        })
        .0
}

/// Rows worth normalizing (trade date + symbol present)
pub fn complete_rows(rows: Vec<RawRow>) -> Vec<RawRow> {
    rows.into_iter().filter(RawRow::is_complete).collect()
}

// ============================================================================
// TESTS
// ============================================================================
