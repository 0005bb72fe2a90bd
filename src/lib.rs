// Trade Combiner - Core Library
// Brokerage CSV statements → classified, combined transaction workbook

pub mod symbols;        // Asset types + built-in symbol table
pub mod store;          // Classification Store (persisted JSON blob)
pub mod classifier;     // Symbol Classifier + symbol universe
pub mod resolution;     // Escalation workflow + resolvers
pub mod parser;         // Statement CSV parsing
pub mod normalizer;     // Raw row → ProcessedTransaction
pub mod deduplication;  // Overlapping export detection
pub mod batch;          // Two-pass Batch Processor
pub mod export;         // xlsx Exporter
pub mod config;

// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use symbols::{AssetType, BUILTIN_SYMBOLS, builtin_type, guess_asset_type, normalize_symbol};
pub use store::{
    ClassificationStore, KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore, SymbolRecord,
    DEFAULT_STORAGE_KEY,
};
pub use classifier::{SymbolClassifier, SymbolUniverse, UnresolvedSymbol};
pub use resolution::{
    CancelResolver, ChannelResolver, Escalation, PendingResolution, PromptResolver, Resolution,
    ResolutionRequest, ResolutionResponse, Resolver, SuggestionResolver,
};
pub use parser::{RawRow, SourceFile, account_from_filename, collect_sources, parse_source};
pub use normalizer::{
    Action, ProcessedTransaction, infer_action, normalize, parse_numeric, parse_trade_date,
};
pub use deduplication::{DeduplicationEngine, DuplicateMatch};
pub use batch::{BatchOptions, BatchProcessor, BatchStats, Ledger};
pub use export::{
    ExportOptions, SHEET_NAME, export, export_ledger, export_ledger_on, export_on, render_workbook,
};
pub use config::{Config, DateEncoding, DecimalSeparator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
