use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rusqlite::Connection;
use serde_json::json;
use spesometro::{db, format_cents, Board, DebitCache};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Boards,
    Members,
    Products,
}

impl Screen {
    pub fn title(&self) -> &str {
        match self {
            Screen::Boards => "Boards",
            Screen::Members => "Members",
            Screen::Products => "Products",
        }
    }
}

/// What the event loop has to do after a key press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    /// Board with this id changed and must be saved
    Persist(String),
}

pub struct App {
    pub boards: Vec<Board>,
    pub screen: Screen,
    pub board_state: TableState,
    pub row_state: TableState,
    pub category_column: usize,
    pub can_edit: bool,
    pub status: String,
    debits: DebitCache,
}

impl App {
    pub fn new(boards: Vec<Board>, can_edit: bool) -> Self {
        let mut board_state = TableState::default();
        if !boards.is_empty() {
            board_state.select(Some(0));
        }

        Self {
            boards,
            screen: Screen::Boards,
            board_state,
            row_state: TableState::default(),
            category_column: 0,
            can_edit,
            status: String::new(),
            debits: DebitCache::new(),
        }
    }

    pub fn selected_board(&self) -> Option<&Board> {
        self.board_state.selected().and_then(|i| self.boards.get(i))
    }

    fn row_count(&self) -> usize {
        match (self.screen, self.selected_board()) {
            (Screen::Boards, _) => self.boards.len(),
            (Screen::Members, Some(board)) => board.members.len(),
            (Screen::Products, Some(board)) => board.products.len(),
            _ => 0,
        }
    }

    fn category_count(&self) -> usize {
        self.selected_board().map(|b| b.categories.len()).unwrap_or(0)
    }

    fn active_state(&mut self) -> &mut TableState {
        match self.screen {
            Screen::Boards => &mut self.board_state,
            _ => &mut self.row_state,
        }
    }

    pub fn next(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let state = self.active_state();
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let state = self.active_state();
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn next_column(&mut self) {
        if self.category_column + 1 < self.category_count() {
            self.category_column += 1;
        }
    }

    pub fn previous_column(&mut self) {
        self.category_column = self.category_column.saturating_sub(1);
    }

    pub fn open_board(&mut self) {
        if self.screen != Screen::Boards || self.selected_board().is_none() {
            return;
        }
        self.screen = Screen::Members;
        self.category_column = 0;
        self.reset_rows();
    }

    pub fn switch_tab(&mut self) {
        self.screen = match self.screen {
            Screen::Boards => return,
            Screen::Members => Screen::Products,
            Screen::Products => Screen::Members,
        };
        self.reset_rows();
    }

    pub fn back(&mut self) {
        self.screen = Screen::Boards;
        self.row_state.select(None);
    }

    fn reset_rows(&mut self) {
        let first = (self.row_count() > 0).then_some(0);
        self.row_state.select(first);
    }

    /// Flip the selected category on the selected member or product
    ///
    /// Returns the id of the changed board.
    pub fn toggle_selected(&mut self) -> Option<String> {
        if !self.can_edit {
            self.status = "Read-only: editing is disabled".to_string();
            return None;
        }

        let row = self.row_state.selected()?;
        let column = self.category_column;
        let screen = self.screen;
        let board = self.board_state.selected().and_then(|i| self.boards.get_mut(i))?;
        let category_id = board.categories.get(column)?.id.clone();

        let toggled = match screen {
            Screen::Members => {
                let member_id = board.members.get(row)?.id.clone();
                board.toggle_member_category(&member_id, &category_id)
            }
            Screen::Products => {
                let product_id = board.products.get(row)?.id.clone();
                board.toggle_product_category(&product_id, &category_id)
            }
            Screen::Boards => return None,
        };

        match toggled {
            Ok(_) => Some(board.id.clone()),
            Err(e) => {
                self.status = e.to_string();
                None
            }
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Option<Action> {
        match code {
            KeyCode::Char('q') => return Some(Action::Quit),
            KeyCode::Esc if self.screen == Screen::Boards => return Some(Action::Quit),
            KeyCode::Esc => self.back(),
            KeyCode::Enter => self.open_board(),
            KeyCode::Tab => self.switch_tab(),
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::Right | KeyCode::Char('l') => self.next_column(),
            KeyCode::Left | KeyCode::Char('h') => self.previous_column(),
            KeyCode::Char(' ') => return self.toggle_selected().map(Action::Persist),
            _ => {}
        }
        None
    }
}

pub fn run_ui(conn: &Connection, app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, conn, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    conn: &Connection,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match app.handle_key(key.code) {
            Some(Action::Quit) => return Ok(()),
            Some(Action::Persist(board_id)) => persist(conn, app, &board_id),
            None => {}
        }
    }
}

fn persist(conn: &Connection, app: &mut App, board_id: &str) {
    let Some(board) = app.boards.iter().find(|b| b.id == board_id) else {
        return;
    };

    let saved = save_with_event(conn, board);

    app.status = match saved {
        Ok(()) => format!("Saved '{}'", board.name),
        Err(e) => {
            tracing::error!("Failed to save board {board_id}: {e}");
            format!("Save failed: {e}")
        }
    };
}

/// Board document and its audit event land together or not at all
fn save_with_event(conn: &Connection, board: &Board) -> spesometro::Result<()> {
    let tx = conn.unchecked_transaction()?;
    db::save_board(&tx, board)?;
    let event = db::Event::new("category_toggled", "board", &board.id, json!({}), "tui");
    db::insert_event(&tx, &event)?;
    tx.commit()?;
    Ok(())
}

// ============================================================================
// Rendering
// ============================================================================

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Table
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.screen {
        Screen::Boards => render_boards(f, chunks[1], app),
        Screen::Members => render_members(f, chunks[1], app),
        Screen::Products => render_products(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn header_style() -> Style {
    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
}

fn highlight_style() -> Style {
    Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        "Spesometro",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];

    if let (Screen::Members | Screen::Products, Some(board)) = (app.screen, app.selected_board()) {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(board.name.clone(), Style::default().fg(Color::White)));

        for screen in [Screen::Members, Screen::Products] {
            spans.push(Span::raw(" │ "));
            let style = if screen == app.screen {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            spans.push(Span::styled(screen.title().to_string(), style));
        }
    } else {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(
            format!("{} boards", app.boards.len()),
            Style::default().fg(Color::White),
        ));
    }

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );

    f.render_widget(header, area);
}

fn render_boards(f: &mut Frame, area: Rect, app: &mut App) {
    let header = Row::new(
        ["Board", "Categories", "Products", "Members", "Total"]
            .iter()
            .map(|h| Cell::from(*h).style(header_style())),
    )
    .style(Style::default().bg(Color::DarkGray));

    let rows = app.boards.iter().map(|board| {
        Row::new(vec![
            Cell::from(truncate(&board.name, 30)),
            Cell::from(board.categories.len().to_string()),
            Cell::from(board.products.len().to_string()),
            Cell::from(board.members.len().to_string()),
            Cell::from(format_cents(board.total_price())),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(32),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(" Boards "))
    .highlight_style(highlight_style())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.board_state);
}

/// Header cells for the category columns, selected one highlighted
fn category_headers<'a>(board: &'a Board, selected: usize) -> impl Iterator<Item = Cell<'a>> {
    board.categories.iter().enumerate().map(move |(i, category)| {
        let style = if i == selected {
            header_style().add_modifier(Modifier::UNDERLINED)
        } else {
            header_style()
        };
        Cell::from(truncate(&category.name, 12)).style(style)
    })
}

fn mark(on: bool) -> Cell<'static> {
    Cell::from(if on { "✅" } else { "❌" })
}

fn category_widths(board: &Board, fixed: &[Constraint]) -> Vec<Constraint> {
    let mut widths = fixed.to_vec();
    widths.extend(board.categories.iter().map(|_| Constraint::Length(12)));
    widths
}

fn render_members(f: &mut Frame, area: Rect, app: &mut App) {
    let Some(index) = app.board_state.selected() else {
        return;
    };
    let Some(board) = app.boards.get(index) else {
        return;
    };
    let sheet = app.debits.get(board);

    let header = Row::new(
        std::iter::once(Cell::from("Member").style(header_style()))
            .chain(category_headers(board, app.category_column))
            .chain(
                ["Paid", "Debit", "Balance"]
                    .iter()
                    .map(|h| Cell::from(*h).style(header_style())),
            ),
    )
    .style(Style::default().bg(Color::DarkGray));

    let rows = board.members.iter().map(|member| {
        let debit = sheet.member(&member.id);
        let balance = debit.map(|d| d.balance).unwrap_or(member.paid);
        let balance_color = if balance < 0 { Color::Red } else { Color::Green };

        let cells = std::iter::once(Cell::from(truncate(&member.name, 20)))
            .chain(board.categories.iter().map(|c| mark(member.is_subscribed(&c.id))))
            .chain([
                Cell::from(format_cents(member.paid)),
                Cell::from(format_cents(debit.map(|d| d.debit).unwrap_or(0))),
                Cell::from(format_cents(balance)).style(Style::default().fg(balance_color)),
            ]);
        Row::new(cells.collect::<Vec<_>>())
    });

    let mut widths = category_widths(board, &[Constraint::Length(22)]);
    widths.extend(std::iter::repeat(Constraint::Length(12)).take(3));

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(" Members "))
        .highlight_style(highlight_style())
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.row_state);
}

fn render_products(f: &mut Frame, area: Rect, app: &mut App) {
    let Some(index) = app.board_state.selected() else {
        return;
    };
    let Some(board) = app.boards.get(index) else {
        return;
    };

    let header = Row::new(
        ["Product", "Cost"]
            .iter()
            .map(|h| Cell::from(*h).style(header_style()))
            .chain(category_headers(board, app.category_column)),
    )
    .style(Style::default().bg(Color::DarkGray));

    let mut rows: Vec<Row> = board
        .products
        .iter()
        .map(|product| {
            let cells = [
                Cell::from(truncate(&product.name, 20)),
                Cell::from(format_cents(product.price)),
            ]
            .into_iter()
            .chain(board.categories.iter().map(|c| mark(product.has_category(&c.id))));
            Row::new(cells.collect::<Vec<_>>())
        })
        .collect();

    rows.push(
        Row::new(vec![
            Cell::from("Total").style(header_style()),
            Cell::from(format_cents(board.total_price())).style(header_style()),
        ])
        .style(Style::default().fg(Color::Cyan)),
    );

    let widths = category_widths(board, &[Constraint::Length(22), Constraint::Length(12)]);

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(" Products "))
        .highlight_style(highlight_style())
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.row_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    let mut spans = match app.screen {
        Screen::Boards => vec![key("Enter"), Span::raw(" Open | ")],
        _ => {
            let mut spans = vec![key("Tab"), Span::raw(" Members/Products | ")];
            spans.extend([key("←/→"), Span::raw(" Category | ")]);
            if app.can_edit {
                spans.extend([key("Space"), Span::raw(" Toggle | ")]);
            }
            spans.extend([key("Esc"), Span::raw(" Back | ")]);
            spans
        }
    };
    spans.extend([key("↑/↓"), Span::raw(" Nav | ")]);
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    if !app.status.is_empty() {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(app.status.clone(), Style::default().fg(Color::Green)));
    }

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spesometro::{NewBoard, NewCategory, NewMember, NewProduct};

    fn sample_board() -> Board {
        let mut board = Board::new(&NewBoard::new("Trip")).unwrap();
        let food = board.add_category(&NewCategory::new("food")).unwrap();
        board.add_category(&NewCategory::new("drink")).unwrap();
        board.add_member(&NewMember::new("Anna", vec![food.clone()], 0)).unwrap();
        board.add_member(&NewMember::new("Bruno", vec![], 0)).unwrap();
        board.add_product(&NewProduct::new("Pizza", 1000, vec![food])).unwrap();
        board
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = App::new(vec![sample_board(), sample_board()], true);

        app.handle_key(KeyCode::Down);
        assert_eq!(app.board_state.selected(), Some(1));
        app.handle_key(KeyCode::Down);
        assert_eq!(app.board_state.selected(), Some(0));
        app.handle_key(KeyCode::Up);
        assert_eq!(app.board_state.selected(), Some(1));
    }

    #[test]
    fn test_open_switch_and_back() {
        let mut app = App::new(vec![sample_board()], true);

        app.handle_key(KeyCode::Enter);
        assert_eq!(app.screen, Screen::Members);
        assert_eq!(app.row_state.selected(), Some(0));

        app.handle_key(KeyCode::Tab);
        assert_eq!(app.screen, Screen::Products);
        app.handle_key(KeyCode::Tab);
        assert_eq!(app.screen, Screen::Members);

        assert_eq!(app.handle_key(KeyCode::Esc), None);
        assert_eq!(app.screen, Screen::Boards);
        assert_eq!(app.handle_key(KeyCode::Esc), Some(Action::Quit));
    }

    #[test]
    fn test_open_without_boards_stays() {
        let mut app = App::new(vec![], true);
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.screen, Screen::Boards);
        assert_eq!(app.handle_key(KeyCode::Char('q')), Some(Action::Quit));
    }

    #[test]
    fn test_category_column_is_clamped() {
        let mut app = App::new(vec![sample_board()], true);
        app.handle_key(KeyCode::Enter);

        app.handle_key(KeyCode::Left);
        assert_eq!(app.category_column, 0);
        app.handle_key(KeyCode::Right);
        app.handle_key(KeyCode::Right);
        assert_eq!(app.category_column, 1);
    }

    #[test]
    fn test_space_toggles_member_category() {
        let board = sample_board();
        let board_id = board.id.clone();
        let mut app = App::new(vec![board], true);
        app.handle_key(KeyCode::Enter);
        app.handle_key(KeyCode::Down); // Bruno

        let action = app.handle_key(KeyCode::Char(' '));

        assert_eq!(action, Some(Action::Persist(board_id)));
        let bruno = &app.boards[0].members[1];
        assert!(bruno.is_subscribed(&app.boards[0].categories[0].id));
    }

    #[test]
    fn test_space_toggles_product_category() {
        let mut app = App::new(vec![sample_board()], true);
        app.handle_key(KeyCode::Enter);
        app.handle_key(KeyCode::Tab);
        app.handle_key(KeyCode::Right); // drink

        assert!(app.handle_key(KeyCode::Char(' ')).is_some());
        let board = &app.boards[0];
        assert!(board.products[0].has_category(&board.categories[1].id));
    }

    #[test]
    fn test_read_only_does_not_toggle() {
        let mut app = App::new(vec![sample_board()], false);
        app.handle_key(KeyCode::Enter);

        assert_eq!(app.handle_key(KeyCode::Char(' ')), None);
        assert!(app.status.contains("Read-only"));
        assert_eq!(app.boards[0].members[0].categories.len(), 1);
    }

    #[test]
    fn test_persist_saves_board() {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let board = sample_board();
        db::insert_board(&conn, &board).unwrap();

        let mut app = App::new(vec![board.clone()], true);
        app.handle_key(KeyCode::Enter);
        app.handle_key(KeyCode::Down);
        let Some(Action::Persist(id)) = app.handle_key(KeyCode::Char(' ')) else {
            panic!("expected a persist action");
        };
        persist(&conn, &mut app, &id);

        let stored = db::get_board(&conn, &board.id).unwrap();
        assert_eq!(stored.members[1].categories.len(), 1);
        assert!(app.status.starts_with("Saved"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long board name", 10), "a very ...");
    }
}
