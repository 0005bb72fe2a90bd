// 📦 Batch Processor - discovery → resolution → materialization
// Two passes so one symbol gets the same type in every file of the batch.
// Any file failing to parse aborts the run: no partial ledger.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::classifier::{SymbolClassifier, SymbolUniverse};
use crate::config::Config;
use crate::deduplication::DeduplicationEngine;
use crate::normalizer::{normalize_with_stats, ProcessedTransaction};
use crate::parser::{complete_rows, parse_source, SourceFile};
use crate::resolution::{Escalation, Resolver};
use crate::store::{ClassificationStore, KeyValueStore, SymbolRecord, DEFAULT_STORAGE_KEY};
use crate::symbols::{normalize_symbol, AssetType, BUILTIN_SYMBOLS};

// ============================================================================
// LEDGER
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub files: usize,
    pub rows_read: usize,
    /// Rows without trade date or symbol
    pub incomplete_rows: usize,
    /// Kept rows whose trade date could not be read (sorted last)
    pub unparsed_dates: usize,
    pub duplicates_removed: usize,
    pub symbols_seen: usize,
    /// Symbols classified during this run's escalation
    pub newly_classified: usize,
    /// Symbols that ended up Missing
    pub missing_symbols: Vec<String>,
    pub escalation_cancelled: bool,
}

/// Result of one run, ordered by trade date (stable); unreadable dates go last
#[derive(Debug, Clone, Serialize)]
pub struct Ledger {
    pub run_id: Uuid,
    pub transactions: Vec<ProcessedTransaction>,
    pub stats: BatchStats,
}

impl Ledger {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub heuristics: bool,
    pub deduplicate: bool,
    pub storage_key: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            heuristics: false,
            deduplicate: true,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl From<&Config> for BatchOptions {
    fn from(config: &Config) -> Self {
        Self {
            heuristics: config.classification.heuristics,
            deduplicate: config.batch.deduplicate,
            storage_key: config.storage.key.clone(),
        }
    }
}

// ============================================================================
// BATCH PROCESSOR
// ============================================================================

/// Owns the classification store for the life of the process.
/// Single writer: nothing else touches the backend while a run is in progress.
pub struct BatchProcessor<K: KeyValueStore> {
    backend: K,
    store: ClassificationStore,
    options: BatchOptions,
}

impl<K: KeyValueStore> BatchProcessor<K> {
    /// Load the store and seed it with the built-in table (absent symbols only)
    pub fn new(backend: K, options: BatchOptions) -> Self {
        let mut store = ClassificationStore::load(&backend, &options.storage_key);
        let added = store.merge(BUILTIN_SYMBOLS);

        let mut processor = BatchProcessor {
            backend,
            store,
            options,
        };
        if added > 0 {
            debug!(added, "Seeded built-in symbol table");
            processor.persist();
        }

        info!(
            symbols = processor.store.len(),
            "Loaded {} symbol mappings",
            processor.store.len()
        );
        processor
    }

    pub fn store(&self) -> &ClassificationStore {
        &self.store
    }

    pub fn backend(&self) -> &K {
        &self.backend
    }

    fn persist(&mut self) -> bool {
        self.store.save(&mut self.backend, &self.options.storage_key)
    }

    /// Manual override outside of a batch (overwrites any existing entry)
    pub fn set_symbol(&mut self, symbol: &str, asset_type: AssetType) -> Result<()> {
        let key = normalize_symbol(symbol);
        if key.is_empty() {
            return Err(anyhow::anyhow!("Symbol must not be empty"));
        }

        let name = self.store.get(&key).and_then(|r| r.name.clone());
        self.store.upsert(SymbolRecord::new(&key, asset_type).with_name(name));
        self.persist();
        info!(symbol = %key, asset_type = %asset_type, "Symbol classification set");
        Ok(())
    }

    /// Run one batch over the given files
    pub fn run(&mut self, files: &[SourceFile], resolver: &mut dyn Resolver) -> Result<Ledger> {
        let run_id = Uuid::new_v4();
        let mut stats = BatchStats {
            files: files.len(),
            ..BatchStats::default()
        };

        if files.is_empty() {
            return Ok(Ledger {
                run_id,
                transactions: Vec::new(),
                stats,
            });
        }

        info!(%run_id, files = files.len(), "Starting batch");

        // 1. Discovery pass
        let universe = self.discover(files)?;
        stats.symbols_seen = universe.len();

        // 2. Resolution
        let mut classifier = SymbolClassifier::from_store(&self.store, self.options.heuristics);
        let resolution = Escalation::begin(classifier.unresolved(&universe)).run(resolver)?;

        for (symbol, asset_type) in &resolution.classified {
            let name = universe.name_of(symbol).map(str::to_string);
            self.store
                .upsert(SymbolRecord::new(symbol, *asset_type).with_name(name));
            classifier.apply(symbol, *asset_type);
        }
        if !resolution.classified.is_empty() {
            self.persist();
        }
        stats.newly_classified = resolution.classified.len();
        stats.missing_symbols = resolution.skipped.clone();
        stats.escalation_cancelled = resolution.cancelled;

        // 3. Materialization pass
        let mut transactions = Vec::new();
        for source in files {
            let rows = parse_source(source)
                .with_context(|| format!("Error processing {}", source.file_name()))?;
            stats.rows_read += rows.len();

            let normalized = normalize_with_stats(&rows, &source.account(), &classifier);
            stats.incomplete_rows += normalized.incomplete;
            stats.unparsed_dates += normalized.unparsed_dates;
            transactions.extend(normalized.transactions);
        }

        if self.options.deduplicate {
            let (kept, matches) = DeduplicationEngine::new().remove_duplicates(transactions);
            for m in &matches {
                debug!(%run_id, reason = %m.reason, "Duplicate dropped");
            }
            stats.duplicates_removed = matches.len();
            transactions = kept;
        }

        // Stable: equal dates keep encounter order, unreadable dates trail
        transactions.sort_by_key(|tx| (tx.date.is_none(), tx.date));

        info!(
            %run_id,
            transactions = transactions.len(),
            missing = stats.missing_symbols.len(),
            duplicates = stats.duplicates_removed,
            "Batch complete"
        );

        Ok(Ledger {
            run_id,
            transactions,
            stats,
        })
    }

    /// Parse every file (row filter only) and collect the distinct symbols
    fn discover(&self, files: &[SourceFile]) -> Result<SymbolUniverse> {
        let mut universe = SymbolUniverse::new();

        for source in files {
            let rows = parse_source(source)
                .with_context(|| format!("Error processing {}", source.file_name()))?;

            for row in complete_rows(rows) {
                universe.observe(
                    row.symbol.as_deref().unwrap_or(""),
                    row.security_name.as_deref(),
                );
            }
        }

        debug!(symbols = universe.len(), "Discovery pass complete");
        Ok(universe)
    }
}

// ============================================================================
// TESTS
// ============================================================================
