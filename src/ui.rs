// 🖥️ Terminal UI - escalation dialog + ledger preview (feature "tui")

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::BTreeMap;
use std::io::{self, Stdout};

use crate::batch::{BatchStats, Ledger};
use crate::classifier::UnresolvedSymbol;
use crate::normalizer::{Action, ProcessedTransaction};
use crate::resolution::{ResolutionRequest, ResolutionResponse, Resolver};
use crate::symbols::AssetType;

type CrosstermTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Raw mode + alternate screen around `body`, restored even when it fails
fn with_terminal<T>(body: impl FnOnce(&mut CrosstermTerminal) -> io::Result<T>) -> Result<T> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = body(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(res?)
}

fn key_hint(key: &str, label: &str) -> Vec<Span<'static>> {
    vec![
        Span::styled(key.to_string(), Style::default().fg(Color::Yellow)),
        Span::raw(format!(" {} | ", label)),
    ]
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn type_color(asset_type: AssetType) -> Color {
    match asset_type {
        AssetType::Stock => Color::Cyan,
        AssetType::Etf => Color::Green,
        AssetType::Bond => Color::Magenta,
        AssetType::Crypto => Color::Yellow,
        AssetType::Missing => Color::Red,
    }
}

// ============================================================================
// ESCALATION DIALOG
// ============================================================================

/// Left empty, then every asset type
const CHOICES: [Option<AssetType>; 6] = [
    None,
    Some(AssetType::Stock),
    Some(AssetType::Crypto),
    Some(AssetType::Etf),
    Some(AssetType::Bond),
    Some(AssetType::Missing),
];

fn choice_index(choice: Option<AssetType>) -> usize {
    CHOICES.iter().position(|c| *c == choice).unwrap_or(0)
}

/// Dialog state: one choice per unresolved symbol, suggestions pre-selected
pub struct ResolutionDialog {
    pub entries: Vec<UnresolvedSymbol>,
    selections: Vec<usize>,
    pub state: TableState,
}

impl ResolutionDialog {
    pub fn new(request: &ResolutionRequest) -> Self {
        let selections = request
            .symbols
            .iter()
            .map(|s| choice_index(s.suggestion))
            .collect();

        let mut state = TableState::default();
        if !request.symbols.is_empty() {
            state.select(Some(0));
        }

        ResolutionDialog {
            entries: request.symbols.clone(),
            selections,
            state,
        }
    }

    pub fn next(&mut self) {
        let len = self.entries.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.entries.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    /// Step the selected symbol's choice forward (or back), wrapping
    pub fn cycle(&mut self, forward: bool) {
        if let Some(i) = self.state.selected() {
            let current = self.selections[i];
            self.selections[i] = if forward {
                (current + 1) % CHOICES.len()
            } else {
                (current + CHOICES.len() - 1) % CHOICES.len()
            };
        }
    }

    pub fn choice(&self, index: usize) -> Option<AssetType> {
        self.selections.get(index).and_then(|&c| CHOICES[c])
    }

    pub fn choices(&self) -> BTreeMap<String, Option<AssetType>> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.symbol.clone(), self.choice(i)))
            .collect()
    }

    pub fn assigned(&self) -> usize {
        (0..self.entries.len()).filter(|&i| self.choice(i).is_some()).count()
    }
}

fn render_dialog(f: &mut Frame, dialog: &mut ResolutionDialog) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(0),    // Symbols
            Constraint::Length(3), // Keys
        ])
        .split(f.size());

    let title = Paragraph::new(vec![Line::from(vec![
        Span::styled(
            "Unknown symbols",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            "  |  {} pending, {} assigned",
            dialog.entries.len(),
            dialog.assigned()
        )),
    ])])
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));
    f.render_widget(title, chunks[0]);

    let header = Row::new(["Symbol", "Name", "Type"].iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    }))
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows: Vec<Row> = dialog
        .entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let choice = match dialog.choice(i) {
                Some(t) => Cell::from(format!("◀ {} ▶", t)).style(Style::default().fg(type_color(t))),
                None => Cell::from("◀ (empty) ▶").style(Style::default().fg(Color::DarkGray)),
            };
            Row::new(vec![
                Cell::from(entry.symbol.clone()),
                Cell::from(truncate(entry.name.as_deref().unwrap_or(""), 40)),
                choice,
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(42),
            Constraint::Length(16),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Choose a type for each symbol "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");
    f.render_stateful_widget(table, chunks[1], &mut dialog.state);

    let mut keys = Vec::new();
    keys.extend(key_hint("↑/↓", "Symbol"));
    keys.extend(key_hint("←/→", "Type"));
    keys.extend(key_hint("Enter", "Save"));
    keys.push(Span::styled("Esc", Style::default().fg(Color::Red)));
    keys.push(Span::raw(" Cancel"));
    let status = Paragraph::new(vec![Line::from(keys)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(status, chunks[2]);
}

fn run_dialog<B: Backend>(
    terminal: &mut Terminal<B>,
    dialog: &mut ResolutionDialog,
) -> io::Result<ResolutionResponse> {
    loop {
        terminal.draw(|f| render_dialog(f, dialog))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Esc | KeyCode::Char('q') => return Ok(ResolutionResponse::Cancelled),
                KeyCode::Enter => return Ok(ResolutionResponse::Confirmed(dialog.choices())),
                KeyCode::Down | KeyCode::Char('j') => dialog.next(),
                KeyCode::Up | KeyCode::Char('k') => dialog.previous(),
                KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') => dialog.cycle(true),
                KeyCode::Left | KeyCode::Char('h') => dialog.cycle(false),
                _ => {}
            }
        }
    }
}

/// Full-screen dialog; blocks the batch until Enter or Esc
pub struct TuiResolver;

impl Resolver for TuiResolver {
    fn resolve(&mut self, request: &ResolutionRequest) -> Result<ResolutionResponse> {
        let mut dialog = ResolutionDialog::new(request);
        with_terminal(|terminal| run_dialog(terminal, &mut dialog))
    }
}

// ============================================================================
// LEDGER PREVIEW
// ============================================================================

pub struct LedgerView {
    pub transactions: Vec<ProcessedTransaction>,
    pub stats: BatchStats,
    pub filter: Option<AssetType>,
    pub state: TableState,
}

impl LedgerView {
    pub fn new(ledger: &Ledger) -> Self {
        let mut state = TableState::default();
        if !ledger.transactions.is_empty() {
            state.select(Some(0));
        }

        LedgerView {
            transactions: ledger.transactions.clone(),
            stats: ledger.stats.clone(),
            filter: None,
            state,
        }
    }

    pub fn visible(&self) -> Vec<&ProcessedTransaction> {
        self.transactions
            .iter()
            .filter(|tx| self.filter.map_or(true, |t| tx.asset_type == t))
            .collect()
    }

    pub fn set_filter(&mut self, filter: Option<AssetType>) {
        self.filter = filter;
        let has_rows = !self.visible().is_empty();
        self.state.select(if has_rows { Some(0) } else { None });
    }

    pub fn count_by_type(&self, asset_type: AssetType) -> usize {
        self.transactions
            .iter()
            .filter(|tx| tx.asset_type == asset_type)
            .count()
    }

    fn step(&mut self, delta: isize) {
        let len = self.visible().len();
        if len == 0 {
            return;
        }
        let current = self.state.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        self.state.select(Some(next as usize));
    }

    pub fn next(&mut self) {
        self.step(1);
    }

    pub fn previous(&mut self) {
        self.step(-1);
    }

    pub fn page_down(&mut self) {
        self.step(20);
    }

    pub fn page_up(&mut self) {
        self.step(-20);
    }
}

fn render_ledger(f: &mut Frame, view: &mut LedgerView) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.size());

    render_ledger_header(f, chunks[0], view);
    render_ledger_table(f, chunks[1], view);
    render_ledger_status(f, chunks[2], view);
}

fn render_ledger_header(f: &mut Frame, area: Rect, view: &LedgerView) {
    let mut spans = vec![Span::styled(
        format!("Ledger: {}", view.transactions.len()),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )];

    for (i, asset_type) in AssetType::ALL.iter().enumerate() {
        spans.push(Span::raw("  │  "));
        let mut style = Style::default().fg(type_color(*asset_type));
        if view.filter == Some(*asset_type) {
            style = style.add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
        }
        spans.push(Span::styled(
            format!("{} {} {}", i + 1, asset_type, view.count_by_type(*asset_type)),
            style,
        ));
    }

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));
    f.render_widget(header, area);
}

fn render_ledger_table(f: &mut Frame, area: Rect, view: &mut LedgerView) {
    let header = Row::new(
        ["Date", "Account", "Type", "Action", "Symbol", "Name", "Cur", "Amount", "Price", "Cost"]
            .iter()
            .map(|h| {
                Cell::from(*h).style(
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            }),
    )
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows: Vec<Row> = view
        .visible()
        .into_iter()
        .map(|tx| {
            let action_color = match tx.action {
                Action::Buy => Color::Green,
                Action::Sell => Color::Red,
            };
            Row::new(vec![
                Cell::from(truncate(&tx.display_date(), 10)),
                Cell::from(truncate(&tx.account, 12)),
                Cell::from(tx.asset_type.to_string()).style(Style::default().fg(type_color(tx.asset_type))),
                Cell::from(tx.action.to_string()).style(Style::default().fg(action_color)),
                Cell::from(tx.symbol.clone()),
                Cell::from(truncate(&tx.name, 28)),
                Cell::from(tx.currency.clone()),
                Cell::from(format!("{:.4}", tx.amount)),
                Cell::from(format!("{:.4}", tx.price)),
                Cell::from(format!("{:.2}", tx.cost)).style(Style::default().fg(action_color)),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(11),
            Constraint::Length(13),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(12),
            Constraint::Length(30),
            Constraint::Length(4),
            Constraint::Length(13),
            Constraint::Length(12),
            Constraint::Length(13),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Combined Transactions "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut view.state);
}

fn render_ledger_status(f: &mut Frame, area: Rect, view: &LedgerView) {
    let selected = view.state.selected().map(|i| i + 1).unwrap_or(0);
    let mut spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, view.visible().len()),
        Style::default().fg(Color::Cyan),
    )];

    if !view.stats.missing_symbols.is_empty() {
        spans.push(Span::raw("| "));
        spans.push(Span::styled(
            format!("Missing: {} ", view.stats.missing_symbols.join(", ")),
            Style::default().fg(Color::Red),
        ));
    }

    spans.push(Span::raw("| "));
    spans.extend(key_hint("1-5", "Filter"));
    spans.extend(key_hint("0", "All"));
    spans.extend(key_hint("↑/↓", "Nav"));
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(status, area);
}

fn run_ledger<B: Backend>(terminal: &mut Terminal<B>, view: &mut LedgerView) -> io::Result<()> {
    loop {
        terminal.draw(|f| render_ledger(f, view))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('0') => view.set_filter(None),
                KeyCode::Char(c @ '1'..='5') => {
                    let index = c as usize - '1' as usize;
                    view.set_filter(Some(AssetType::ALL[index]));
                }
                KeyCode::Down | KeyCode::Char('j') => view.next(),
                KeyCode::Up | KeyCode::Char('k') => view.previous(),
                KeyCode::PageDown => view.page_down(),
                KeyCode::PageUp => view.page_up(),
                _ => {}
            }
        }
    }
}

/// Browse the combined ledger until q/Esc
pub fn run_preview(ledger: &Ledger) -> Result<()> {
    let mut view = LedgerView::new(ledger);
    with_terminal(|terminal| run_ledger(terminal, &mut view))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ratatui::backend::TestBackend;
    use uuid::Uuid;

    fn pending(symbol: &str, suggestion: Option<AssetType>) -> UnresolvedSymbol {
        UnresolvedSymbol {
            symbol: symbol.to_string(),
            name: Some(format!("{} Holdings", symbol)),
            suggestion,
        }
    }

    fn create_test_transaction(symbol: &str, asset_type: AssetType) -> ProcessedTransaction {
        ProcessedTransaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 2),
            date_text: "2024-01-02".to_string(),
            account: "LHV".to_string(),
            asset_type,
            action: Action::Buy,
            symbol: symbol.to_string(),
            name: "Test".to_string(),
            currency: "EUR".to_string(),
            amount: 1.0,
            price: 2.0,
            cost: -2.0,
            fee: 0.0,
            reference: String::new(),
        }
    }

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_dialog_preselects_suggestions() {
        let request = ResolutionRequest {
            symbols: vec![pending("AAA", Some(AssetType::Etf)), pending("BBB", None)],
        };
        let dialog = ResolutionDialog::new(&request);

        assert_eq!(dialog.choice(0), Some(AssetType::Etf));
        assert_eq!(dialog.choice(1), None);
        assert_eq!(dialog.assigned(), 1);
        assert_eq!(dialog.state.selected(), Some(0));
    }

    #[test]
    fn test_dialog_navigation_and_cycling() {
        let request = ResolutionRequest {
            symbols: vec![pending("AAA", None), pending("BBB", None)],
        };
        let mut dialog = ResolutionDialog::new(&request);

        dialog.cycle(true);
        assert_eq!(dialog.choice(0), Some(AssetType::Stock));
        dialog.cycle(false);
        dialog.cycle(false);
        assert_eq!(dialog.choice(0), Some(AssetType::Missing));

        dialog.next();
        dialog.cycle(true);
        dialog.cycle(true);
        assert_eq!(dialog.choice(1), Some(AssetType::Crypto));

        // Wraps around
        dialog.next();
        assert_eq!(dialog.state.selected(), Some(0));
        dialog.previous();
        assert_eq!(dialog.state.selected(), Some(1));

        let choices = dialog.choices();
        assert_eq!(choices["AAA"], Some(AssetType::Missing));
        assert_eq!(choices["BBB"], Some(AssetType::Crypto));
    }

    #[test]
    fn test_dialog_renders_symbols() {
        let request = ResolutionRequest {
            symbols: vec![pending("ZZQQ1", Some(AssetType::Bond))],
        };
        let mut dialog = ResolutionDialog::new(&request);
        let mut terminal = Terminal::new(TestBackend::new(100, 12)).unwrap();

        terminal.draw(|f| render_dialog(f, &mut dialog)).unwrap();
        let text = buffer_text(&terminal);
        assert!(text.contains("ZZQQ1"));
        assert!(text.contains("Bond"));
    }

    #[test]
    fn test_ledger_view_filter() {
        let ledger = Ledger {
            run_id: Uuid::new_v4(),
            transactions: vec![
                create_test_transaction("AAPL", AssetType::Stock),
                create_test_transaction("ESP0", AssetType::Etf),
                create_test_transaction("MSFT", AssetType::Stock),
            ],
            stats: BatchStats::default(),
        };
        let mut view = LedgerView::new(&ledger);

        assert_eq!(view.visible().len(), 3);
        assert_eq!(view.count_by_type(AssetType::Stock), 2);

        view.set_filter(Some(AssetType::Etf));
        assert_eq!(view.visible().len(), 1);
        assert_eq!(view.state.selected(), Some(0));

        view.set_filter(Some(AssetType::Bond));
        assert!(view.visible().is_empty());
        assert_eq!(view.state.selected(), None);

        view.set_filter(None);
        view.page_down();
        assert_eq!(view.state.selected(), Some(2));
        view.previous();
        assert_eq!(view.state.selected(), Some(1));
    }

    #[test]
    fn test_ledger_renders_rows() {
        let ledger = Ledger {
            run_id: Uuid::new_v4(),
            transactions: vec![create_test_transaction("AAPL", AssetType::Stock)],
            stats: BatchStats {
                missing_symbols: vec!["ZZQQ1".to_string()],
                ..BatchStats::default()
            },
        };
        let mut view = LedgerView::new(&ledger);
        let mut terminal = Terminal::new(TestBackend::new(160, 10)).unwrap();

        terminal.draw(|f| render_ledger(f, &mut view)).unwrap();
        let text = buffer_text(&terminal);
        assert!(text.contains("AAPL"));
        assert!(text.contains("02.01.2024"));
        assert!(text.contains("ZZQQ1"));
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("Tallinna Vesi", 20), "Tallinna Vesi");
        assert_eq!(truncate("Võlakiri ÄÖÜ pikk nimi", 10), "Võlakir...");
    }
}
