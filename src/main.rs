use anyhow::{bail, Result};
use clap::Parser;
use std::io::{self, BufReader, IsTerminal};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use trade_combiner::{
    collect_sources, export_ledger, BatchOptions, BatchProcessor, CancelResolver, Config, DateEncoding,
    DecimalSeparator, ExportOptions, KeyValueStore, Ledger, MemoryKeyValueStore, PromptResolver,
    Resolver, SqliteKeyValueStore, SuggestionResolver,
};
use trade_combiner::symbols::AssetType;

/// 📈 Combine brokerage CSV statements into one classified xlsx workbook
#[derive(Debug, Parser)]
#[command(name = "trade-combiner", version, about)]
struct Cli {
    /// Statement files or directories (directories expand to their .csv files)
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,

    /// JSON config file (default: ./trade-combiner.json when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite file holding learned classifications (":memory:" for a throwaway store)
    #[arg(long)]
    db: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    decimal_separator: Option<DecimalSeparator>,

    #[arg(long, value_enum)]
    date_encoding: Option<DateEncoding>,

    /// Suggest types for unknown symbols from their code and name
    #[arg(long)]
    heuristics: bool,

    /// Never ask: unknown symbols take the suggestion (with --heuristics) or stay Missing
    #[arg(long)]
    no_interactive: bool,

    /// Keep rows repeated across overlapping exports
    #[arg(long)]
    no_dedup: bool,

    /// Browse the combined ledger after export
    #[arg(long)]
    preview: bool,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long)]
    verbose: bool,

    /// Print stored symbol classifications
    #[arg(long)]
    list_symbols: bool,

    /// Record a classification, e.g. --set-symbol LHV1T=Stock (repeatable)
    #[arg(long = "set-symbol", value_name = "SYMBOL=TYPE", value_parser = parse_symbol_assignment)]
    set_symbol: Vec<(String, AssetType)>,
}

fn parse_symbol_assignment(input: &str) -> Result<(String, AssetType), String> {
    let (symbol, asset_type) = input
        .split_once('=')
        .ok_or_else(|| format!("expected SYMBOL=TYPE, got '{}'", input))?;
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err("symbol must not be empty".to_string());
    }
    let asset_type = asset_type.parse::<AssetType>().map_err(|e| e.to_string())?;
    Ok((symbol.to_string(), asset_type))
}

impl Cli {
    /// Flags win over the config file
    fn apply(&self, config: &mut Config) {
        if let Some(db) = &self.db {
            config.storage.path = db.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.export.output_dir = dir.clone();
        }
        if let Some(sep) = self.decimal_separator {
            config.export.decimal_separator = sep;
        }
        if let Some(encoding) = self.date_encoding {
            config.export.date_encoding = encoding;
        }
        if self.heuristics {
            config.classification.heuristics = true;
        }
        if self.no_interactive {
            config.classification.interactive = false;
        }
        if self.no_dedup {
            config.batch.deduplicate = false;
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("❌ Error processing files");
        eprintln!("   {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    if config.storage.path.as_os_str() == ":memory:" {
        run_with(MemoryKeyValueStore::new(), &config, &cli)
    } else {
        let backend = SqliteKeyValueStore::open(&config.storage.path)?;
        run_with(backend, &config, &cli)
    }
}

fn run_with<K: KeyValueStore>(backend: K, config: &Config, cli: &Cli) -> Result<()> {
    let mut processor = BatchProcessor::new(backend, BatchOptions::from(config));

    for (symbol, asset_type) in &cli.set_symbol {
        processor.set_symbol(symbol, *asset_type)?;
        println!("✓ {} → {}", symbol.to_uppercase(), asset_type);
    }

    if cli.list_symbols {
        list_symbols(&processor);
    }

    if cli.files.is_empty() {
        if cli.list_symbols || !cli.set_symbol.is_empty() {
            return Ok(());
        }
        bail!("No input files given");
    }

    // 1. Collect sources
    println!("📂 Collecting statements...");
    let sources = collect_sources(&cli.files)?;
    if sources.is_empty() {
        bail!("No .csv files found in the given paths");
    }
    for source in &sources {
        println!("   • {} (account {})", source.file_name(), source.account());
    }

    // 2. Batch
    println!("\n🔄 Processing {} file(s)...", sources.len());
    let mut resolver = make_resolver(config);
    let ledger = processor.run(&sources, resolver.as_mut())?;
    print_summary(&ledger);

    // 3. Export
    println!("\n💾 Exporting...");
    match export_ledger(&ledger, &ExportOptions::from(&config.export))? {
        Some(path) => println!("✅ Wrote {} transactions to {}", ledger.len(), path.display()),
        None => println!("⚠️  No transactions to export, no workbook written"),
    }

    if cli.preview {
        preview(&ledger)?;
    }

    Ok(())
}

fn make_resolver(config: &Config) -> Box<dyn Resolver> {
    if !config.classification.interactive || !io::stdin().is_terminal() {
        return if config.classification.heuristics {
            Box::new(SuggestionResolver)
        } else {
            Box::new(CancelResolver)
        };
    }

    #[cfg(feature = "tui")]
    if io::stdout().is_terminal() {
        return Box::new(trade_combiner::ui::TuiResolver);
    }

    Box::new(PromptResolver::new(BufReader::new(io::stdin()), io::stdout()))
}

fn list_symbols<K: KeyValueStore>(processor: &BatchProcessor<K>) {
    println!("📚 {} stored symbol(s)", processor.store().len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for record in processor.store().records() {
        println!(
            "{:<14} {:<8} {:<20} {}",
            record.symbol,
            record.asset_type,
            record.last_updated.format("%Y-%m-%d %H:%M"),
            record.name.as_deref().unwrap_or("")
        );
    }
}

fn print_summary(ledger: &Ledger) {
    let stats = &ledger.stats;
    println!("✓ Run {}", ledger.run_id);
    println!("✓ {} rows read, {} transactions kept", stats.rows_read, ledger.len());
    if stats.incomplete_rows > 0 {
        println!("⚠️  Dropped {} row(s) without trade date or symbol", stats.incomplete_rows);
    }
    if stats.unparsed_dates > 0 {
        println!(
            "⚠️  Kept {} row(s) with unreadable trade dates (listed last)",
            stats.unparsed_dates
        );
    }
    if stats.duplicates_removed > 0 {
        println!("✓ Duplicates removed: {}", stats.duplicates_removed);
    }
    if stats.newly_classified > 0 {
        println!("✓ Newly classified symbols: {}", stats.newly_classified);
    }
    if !stats.missing_symbols.is_empty() {
        println!("⚠️  Missing type: {}", stats.missing_symbols.join(", "));
    }
}

#[cfg(feature = "tui")]
fn preview(ledger: &Ledger) -> Result<()> {
    trade_combiner::ui::run_preview(ledger)
}

#[cfg(not(feature = "tui"))]
fn preview(ledger: &Ledger) -> Result<()> {
    println!("\n{:<10} {:<12} {:<8} {:<5} {:<10} {}", "Date", "Account", "Type", "Action", "Symbol", "Name");
    for tx in &ledger.transactions {
        println!(
            "{:<10} {:<12} {:<8} {:<5} {:<10} {}",
            tx.display_date(),
            tx.account,
            tx.asset_type,
            tx.action,
            tx.symbol,
            tx.name
        );
    }
    println!("{} record(s)", ledger.len());
    Ok(())
}
