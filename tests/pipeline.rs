// 🧪 End-to-end: statements → batch → workbook on disk → read back

use calamine::{open_workbook, Data, Reader, Xlsx};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::thread;

use trade_combiner::export::{excel_serial, parse_localized, HEADER};
use trade_combiner::{
    collect_sources, export_on, AssetType, BatchOptions, BatchProcessor, CancelResolver,
    ChannelResolver, ClassificationStore, DateEncoding, DecimalSeparator, ExportOptions,
    MemoryKeyValueStore, ResolutionRequest, ResolutionResponse, Resolver, SourceFile,
    SqliteKeyValueStore, DEFAULT_STORAGE_KEY, SHEET_NAME,
};

const HEADER_LINE: &str = "VÄÄRTUSPÄEV,TEHINGUPÄEV,TEHING,SÜMBOL,VÄÄRTPABER,KOGUS,HIND,VALUUTA,NETOSUMMA,TEENUSTASU,KOKKU,VIIDE,KOMMENTAAR";

fn write_statement(dir: &Path, name: &str, header: &str, lines: &[&str]) {
    let mut content = String::from(header);
    for line in lines {
        content.push('\n');
        content.push_str(line);
    }
    content.push('\n');
    fs::write(dir.join(name), content).unwrap();
}

/// Two accounts, one of them semicolon-delimited, files named so the newer one sorts first
fn fixture_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_statement(
        dir.path(),
        "LHV_2025_Metallid.csv",
        HEADER_LINE,
        &[
            "2025-01-17,2025-01-15,ost,XAD5,Xtrackers Physical Gold,0.080,247.66,EUR,-19.80,-0.20,-20.00,FID1,",
            "2025-01-18,2025-01-16,müük,btc,Bitcoin,-0.0012345,95000.1234,EUR,114.05,-1.15,112.90,FID2,",
            ",,ost,XAD5,no date,1,1,EUR,-1,0,,,",
        ],
    );
    write_statement(
        dir.path(),
        "Swedbank_2019.csv",
        &HEADER_LINE.replace(',', ";"),
        &["2019-06-05;2019-06-03;OST;AAPL;Apple Inc;3;1234.5;USD;-3703.50;-5.00;-3708.50;S1;"],
    );
    fs::write(dir.path().join("notes.txt"), "not a statement").unwrap();
    dir
}

fn read_sheet(path: &Path) -> Vec<Vec<Data>> {
    let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
    let range = workbook.worksheet_range(SHEET_NAME).unwrap();
    range.rows().map(|row| row.to_vec()).collect()
}

fn text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        other => panic!("expected text cell, got {:?}", other),
    }
}

fn serial(cell: &Data) -> f64 {
    match cell {
        Data::Float(f) => *f,
        Data::Int(i) => *i as f64,
        Data::DateTime(dt) => dt.as_f64(),
        other => panic!("expected date cell, got {:?}", other),
    }
}

/// Answers every request with a fixed type and counts how often it was asked
struct FixedResolver {
    answer: AssetType,
    calls: usize,
}

impl Resolver for FixedResolver {
    fn resolve(&mut self, request: &ResolutionRequest) -> anyhow::Result<ResolutionResponse> {
        self.calls += 1;
        let choices: BTreeMap<String, Option<AssetType>> = request
            .symbols
            .iter()
            .map(|s| (s.symbol.clone(), Some(self.answer)))
            .collect();
        Ok(ResolutionResponse::Confirmed(choices))
    }
}

#[test]
fn test_directory_batch_to_workbook() {
    let input = fixture_dir();
    let output = tempfile::tempdir().unwrap();

    let sources = collect_sources(&[input.path().to_path_buf()]).unwrap();
    let names: Vec<String> = sources.iter().map(SourceFile::file_name).collect();
    assert_eq!(names, vec!["LHV_2025_Metallid.csv", "Swedbank_2019.csv"]);

    let mut processor = BatchProcessor::new(MemoryKeyValueStore::new(), BatchOptions::default());
    let ledger = processor.run(&sources, &mut CancelResolver).unwrap();
    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.stats.incomplete_rows, 1);

    let options = ExportOptions {
        output_dir: output.path().to_path_buf(),
        ..ExportOptions::default()
    };
    let date = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
    let path = export_on(&ledger.transactions, &options, date).unwrap();
    assert!(path.ends_with("combined_transactions_20250201.xlsx"));

    let rows = read_sheet(&path);
    assert_eq!(rows.len(), 4);

    let header: Vec<String> = rows[0].iter().map(text).collect();
    assert_eq!(header, HEADER.to_vec());

    // 2019 first even though its file came second
    let aapl = &rows[1];
    assert_eq!(
        serial(&aapl[0]) as i64,
        excel_serial(NaiveDate::from_ymd_opt(2019, 6, 3).unwrap())
    );
    assert_eq!(text(&aapl[1]), "Swedbank");
    assert_eq!(text(&aapl[2]), "Stock");
    assert_eq!(text(&aapl[3]), "Buy");
    assert_eq!(text(&aapl[8]), "1\u{a0}234,5000");
    assert_eq!(text(&aapl[9]), "-3\u{a0}703,50");

    let gold = &rows[2];
    assert_eq!(text(&gold[1]), "LHV");
    assert_eq!(text(&gold[2]), "ETF");
    assert_eq!(text(&gold[7]), "0,080000");

    let btc = &rows[3];
    assert_eq!(text(&btc[2]), "Crypto");
    assert_eq!(text(&btc[3]), "Sell");
    assert_eq!(text(&btc[4]), "BTC");
}

#[test]
fn test_numbers_survive_round_trip() {
    let input = fixture_dir();
    let output = tempfile::tempdir().unwrap();
    let sources = collect_sources(&[input.path().to_path_buf()]).unwrap();
    let ledger = BatchProcessor::new(MemoryKeyValueStore::new(), BatchOptions::default())
        .run(&sources, &mut CancelResolver)
        .unwrap();

    for separator in [DecimalSeparator::Comma, DecimalSeparator::Period] {
        let options = ExportOptions {
            output_dir: output.path().to_path_buf(),
            decimal_separator: separator,
            ..ExportOptions::default()
        };
        let path = export_on(&ledger.transactions, &options, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap())
            .unwrap();
        let rows = read_sheet(&path);

        for (tx, row) in ledger.transactions.iter().zip(rows.iter().skip(1)) {
            for (col, value, decimals) in [
                (7, tx.amount, 6),
                (8, tx.price, 4),
                (9, tx.cost, 2),
                (10, tx.fee, 2),
            ] {
                let read = parse_localized(&text(&row[col]), separator).unwrap();
                let tolerance = 0.5 * 10f64.powi(-decimals) + 1e-9;
                assert!(
                    (read - value).abs() <= tolerance,
                    "column {} of {}: wrote {}, read {}",
                    col,
                    tx.symbol,
                    value,
                    read
                );
            }
        }
    }
}

#[test]
fn test_export_twice_gives_identical_rows() {
    let input = fixture_dir();
    let output = tempfile::tempdir().unwrap();
    let sources = collect_sources(&[input.path().to_path_buf()]).unwrap();
    let ledger = BatchProcessor::new(MemoryKeyValueStore::new(), BatchOptions::default())
        .run(&sources, &mut CancelResolver)
        .unwrap();

    let options = ExportOptions {
        output_dir: output.path().to_path_buf(),
        ..ExportOptions::default()
    };
    let date = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
    let first = export_on(&ledger.transactions, &options, date).unwrap();
    let second = export_on(&ledger.transactions, &options, date).unwrap();

    assert_ne!(first, second);
    assert_eq!(read_sheet(&first), read_sheet(&second));
}

#[test]
fn test_formula_dates_write_a_workbook() {
    let input = fixture_dir();
    let output = tempfile::tempdir().unwrap();
    let sources = collect_sources(&[input.path().to_path_buf()]).unwrap();
    let ledger = BatchProcessor::new(MemoryKeyValueStore::new(), BatchOptions::default())
        .run(&sources, &mut CancelResolver)
        .unwrap();

    let options = ExportOptions {
        output_dir: output.path().to_path_buf(),
        date_encoding: DateEncoding::Formula,
        ..ExportOptions::default()
    };
    let path = export_on(&ledger.transactions, &options, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap())
        .unwrap();

    let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
    let formulas = workbook.worksheet_formula(SHEET_NAME).unwrap();
    let first = formulas.get_value((1, 0)).cloned().unwrap_or_default();
    assert!(first.contains("DATE(2019,6,3)"), "got {:?}", first);
}

#[test]
fn test_learned_symbols_persist_in_sqlite() {
    let input = tempfile::tempdir().unwrap();
    write_statement(
        input.path(),
        "LHV_2024.csv",
        HEADER_LINE,
        &[",2024-03-01,ost,INBB070031A,Inbank võlakiri,1,1000,EUR,-1000,0,,,"],
    );
    let db = input.path().join("symbols.db");
    let sources = collect_sources(&[input.path().join("LHV_2024.csv")]).unwrap();

    let mut resolver = FixedResolver {
        answer: AssetType::Bond,
        calls: 0,
    };
    {
        let backend = SqliteKeyValueStore::open(&db).unwrap();
        let mut processor = BatchProcessor::new(backend, BatchOptions::default());
        let ledger = processor.run(&sources, &mut resolver).unwrap();
        assert_eq!(ledger.transactions[0].asset_type, AssetType::Bond);
    }
    assert_eq!(resolver.calls, 1);

    // Fresh process: nothing left to ask
    let backend = SqliteKeyValueStore::open(&db).unwrap();
    let stored = ClassificationStore::load(&backend, DEFAULT_STORAGE_KEY);
    assert_eq!(
        stored.get("INBB070031A").and_then(|r| r.name.as_deref()),
        Some("Inbank võlakiri")
    );

    let mut processor = BatchProcessor::new(backend, BatchOptions::default());
    let ledger = processor.run(&sources, &mut resolver).unwrap();
    assert_eq!(resolver.calls, 1);
    assert_eq!(ledger.transactions[0].asset_type, AssetType::Bond);
}

#[test]
fn test_escalation_over_channel_blocks_until_answered() {
    let input = tempfile::tempdir().unwrap();
    write_statement(
        input.path(),
        "A_1.csv",
        HEADER_LINE,
        &[
            ",2024-03-01,ost,QQQ1X,First Unknown,1,1,EUR,-1,0,,,",
            ",2024-03-02,ost,QQQ2X,Second Unknown,1,1,EUR,-1,0,,,",
        ],
    );
    let sources = collect_sources(&[input.path().to_path_buf()]).unwrap();

    let (mut resolver, requests) = ChannelResolver::channel();
    let ui = thread::spawn(move || {
        let pending = requests.recv().unwrap();
        let asked: Vec<String> = pending.request.symbols.iter().map(|s| s.symbol.clone()).collect();

        let mut choices = BTreeMap::new();
        choices.insert("QQQ1X".to_string(), Some(AssetType::Stock));
        choices.insert("QQQ2X".to_string(), None);
        pending.reply.send(ResolutionResponse::Confirmed(choices)).unwrap();
        asked
    });

    let mut processor = BatchProcessor::new(MemoryKeyValueStore::new(), BatchOptions::default());
    let ledger = processor.run(&sources, &mut resolver).unwrap();

    assert_eq!(ui.join().unwrap(), vec!["QQQ1X", "QQQ2X"]);
    assert_eq!(ledger.transactions[0].asset_type, AssetType::Stock);
    assert_eq!(ledger.transactions[1].asset_type, AssetType::Missing);
    assert_eq!(ledger.stats.missing_symbols, vec!["QQQ2X".to_string()]);
    assert!(processor.store().get("QQQ2X").is_none());
}

#[test]
fn test_malformed_file_aborts_whole_batch() {
    let input = tempfile::tempdir().unwrap();
    write_statement(
        input.path(),
        "A_good.csv",
        HEADER_LINE,
        &[",2024-03-01,ost,AAPL,Apple,1,1,EUR,-1,0,,,"],
    );
    let mut bad = HEADER_LINE.as_bytes().to_vec();
    bad.extend_from_slice(b"\n,2024-03-01,ost,\xff\xfe,Broken,1,1,EUR,-1,0,,,\n");
    fs::write(input.path().join("B_bad.csv"), bad).unwrap();

    let sources = collect_sources(&[input.path().to_path_buf()]).unwrap();
    let err = BatchProcessor::new(MemoryKeyValueStore::new(), BatchOptions::default())
        .run(&sources, &mut CancelResolver)
        .unwrap_err();

    assert!(format!("{:#}", err).contains("B_bad.csv"));
}
