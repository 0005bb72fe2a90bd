// ⚙️ Configuration - JSON file + defaults, CLI flags override on top

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::store::DEFAULT_STORAGE_KEY;

/// Looked up in the working directory when no --config is given
pub const DEFAULT_CONFIG_FILE: &str = "trade-combiner.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub classification: ClassificationConfig,
    pub batch: BatchConfig,
    pub export: ExportConfig,
}

/// Where the classification store lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding the key-value table (":memory:" for a throwaway store)
    pub path: PathBuf,
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("trade-combiner.db"),
            key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Offer pattern-based guesses for unknown symbols
    pub heuristics: bool,
    /// Ask a human about unknown symbols (otherwise they stay Missing,
    /// or take the heuristic guess when heuristics are on)
    pub interactive: bool,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            heuristics: false,
            interactive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Collapse rows repeated across overlapping exports
    pub deduplicate: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { deduplicate: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DecimalSeparator {
    /// 1 234,56 (Estonian / European)
    #[default]
    Comma,
    /// 1,234.56 (US / UK)
    Period,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DateEncoding {
    /// Spreadsheet serial number formatted dd.mm.yyyy
    #[default]
    Serial,
    /// =DATE(y,m,d) formula
    Formula,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub decimal_separator: DecimalSeparator,
    pub date_encoding: DateEncoding,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: "combined_transactions".to_string(),
            decimal_separator: DecimalSeparator::Comma,
            date_encoding: DateEncoding::Serial,
        }
    }
}

impl Config {
    /// Load config from a JSON file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON: {:?}", path.as_ref()))?;

        Ok(config)
    }

    /// Explicit path must load; the default location is optional
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
