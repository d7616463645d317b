use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use fix_clients::entities::{CostCategory, Session};
use fix_clients::table::{render_row, ColumnGroup, TableCell, COLUMNS};
use fix_clients::ClientRow;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

const MAX_COLUMN_WIDTH: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Clients,
    Limits,
    Sessions,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Clients => Page::Limits,
            Page::Limits => Page::Sessions,
            Page::Sessions => Page::Clients,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Clients => Page::Sessions,
            Page::Limits => Page::Clients,
            Page::Sessions => Page::Limits,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Clients => "Client Table",
            Page::Limits => "Order Limits",
            Page::Sessions => "Sessions",
        }
    }

    /// Column indexes into `COLUMNS` shown on this page.
    fn columns(&self) -> Vec<usize> {
        match self {
            Page::Clients => COLUMNS
                .iter()
                .enumerate()
                .filter(|(_, c)| c.group != ColumnGroup::Limits)
                .map(|(i, _)| i)
                .collect(),
            Page::Limits => COLUMNS
                .iter()
                .enumerate()
                .filter(|(i, c)| *i == 0 || c.group == ColumnGroup::Limits)
                .map(|(i, _)| i)
                .collect(),
            Page::Sessions => Vec::new(),
        }
    }
}

pub struct App {
    pub rows: Vec<ClientRow>,
    cells: Vec<Vec<TableCell>>,
    pub sessions: Vec<Session>,
    pub state: TableState,
    pub sessions_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
}

impl App {
    pub fn new(rows: Vec<ClientRow>, sessions: Vec<Session>) -> Self {
        let mut state = TableState::default();
        if !rows.is_empty() {
            state.select(Some(0));
        }

        let mut sessions_state = TableState::default();
        if !sessions.is_empty() {
            sessions_state.select(Some(0));
        }

        let cells = rows.iter().map(render_row).collect();

        Self {
            rows,
            cells,
            sessions,
            state,
            sessions_state,
            current_page: Page::Clients,
            show_detail: false,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_row(&self) -> Option<&ClientRow> {
        self.state.selected().and_then(|i| self.rows.get(i))
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    fn active(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::Sessions => (&mut self.sessions_state, self.sessions.len()),
            Page::Clients | Page::Limits => (&mut self.state, self.rows.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let i = state.selected().map(|i| (i + 20).min(len - 1)).unwrap_or(0);
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let i = state.selected().map(|i| i.saturating_sub(20)).unwrap_or(0);
        state.select(Some(i));
    }

    pub fn home(&mut self) {
        let (state, len) = self.active();
        if len > 0 {
            state.select(Some(0));
        }
    }

    pub fn end(&mut self) {
        let (state, len) = self.active();
        if len > 0 {
            state.select(Some(len - 1));
        }
    }

    pub fn client_count(&self) -> usize {
        let mut ids: Vec<i64> = self.rows.iter().map(|r| r.client_id).collect();
        ids.dedup();
        ids.len()
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.home(),
                KeyCode::End => app.end(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page != Page::Sessions {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_client_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Clients | Page::Limits => render_client_table(f, chunks[1], app),
            Page::Sessions => render_sessions(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Clients, Page::Limits, Page::Sessions].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Clients: {}", app.client_count()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Rows: {}", app.rows.len()),
        Style::default().fg(Color::Green),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_client_table(f: &mut Frame, area: Rect, app: &mut App) {
    let columns = app.current_page.columns();

    let header_cells = columns.iter().map(|&i| {
        Cell::from(COLUMNS[i].name).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let widths: Vec<Constraint> = columns
        .iter()
        .map(|&i| {
            let widest = app
                .cells
                .iter()
                .map(|row| row[i].text.chars().count())
                .chain(std::iter::once(COLUMNS[i].name.len()))
                .max()
                .unwrap_or(0);
            Constraint::Length(widest.min(MAX_COLUMN_WIDTH) as u16 + 1)
        })
        .collect();

    let rows = app.cells.iter().map(|cells| {
        let row_cells = columns.iter().map(|&i| {
            let cell = &cells[i];
            let style = if cell.link.is_some() {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default()
            };
            Cell::from(truncate(&cell.text, MAX_COLUMN_WIDTH)).style(style)
        });
        Row::new(row_cells).height(1)
    });

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(format!(" {} ", app.current_page.title())),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_sessions(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Id", "Session", "Start", "End"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.sessions.iter().map(|session| {
        Row::new(vec![
            Cell::from(session.id.to_string()),
            Cell::from(session.name.clone()),
            Cell::from(session.start_time.format("%H:%M:%S").to_string()),
            Cell::from(session.end_time.format("%H:%M:%S").to_string()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(32),
            Constraint::Length(10),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Sessions "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.sessions_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Sessions => (app.sessions_state.selected(), app.sessions.len()),
        Page::Clients | Page::Limits => (app.state.selected(), app.rows.len()),
    };

    let status_spans = vec![
        Span::styled(
            format!(" Row: {}/{} ", selected.map(|i| i + 1).unwrap_or(0), total),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Details | "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" Page | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Nav | "),
        Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)),
        Span::raw(" Fast | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
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

fn label(name: &str) -> Span<'static> {
    Span::styled(
        format!("  {}: ", name),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )
}

fn section(title: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!("  {}", title),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
    ))
}

fn detail_lines(row: &ClientRow) -> Vec<Line<'static>> {
    let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());

    let mut lines = vec![
        Line::from(""),
        Line::from(vec![label("Client"), Span::raw(row.client_name.clone())]),
        Line::from(vec![label("Identifier"), Span::raw(row.identifier.clone())]),
        Line::from(vec![label("View / Code"), Span::raw(format!("{} / {}", row.view, row.code))]),
        Line::from(vec![
            label("Session"),
            Span::raw(format!("{} ({})", row.session, row.session_start_end)),
        ]),
        Line::from(vec![
            label("Connection"),
            Span::raw(format!("{} → {}", date(row.connection_start_date), date(row.connection_end_date))),
        ]),
        Line::from(vec![label("Products"), Span::raw(row.products.clone())]),
        Line::from(vec![label("Limit Trade Types"), Span::raw(row.limit_trade_types.clone())]),
        Line::from(""),
        section("COSTS"),
        Line::from(""),
    ];

    for category in CostCategory::ALL {
        let costs: Vec<_> = row.costs.iter().filter(|c| c.category() == Some(category)).collect();
        if costs.is_empty() {
            continue;
        }
        lines.push(Line::from(Span::styled(
            format!("  {}", category.name()),
            Style::default().fg(Color::Green),
        )));
        for cost in costs {
            let change = cost
                .change
                .map(fix_clients::table::format_amount)
                .unwrap_or_default();
            lines.push(Line::from(Span::raw(format!(
                "    {} {} {} {} {}",
                cost.vendor.as_deref().unwrap_or("-"),
                cost.product_handlinst(),
                cost.change_type.as_deref().unwrap_or(""),
                change,
                cost.currency.as_deref().unwrap_or(""),
            ))));
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  Press Enter to close",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));
    lines
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Client Details ");

    let panel = match app.selected_row() {
        Some(row) => Paragraph::new(detail_lines(row)).block(block),
        None => Paragraph::new("No client selected").block(block),
    };

    f.render_widget(panel, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use fix_clients::entities::OrderLimits;

    fn row(client_id: i64, name: &str) -> ClientRow {
        ClientRow {
            client_id,
            client_name: name.to_string(),
            identifier: format!("{}1", name),
            view: "V".to_string(),
            code: "C".to_string(),
            session: "Tokyo Day".to_string(),
            session_start_end: "09:00:00-15:00:00".to_string(),
            connection_start_date: None,
            connection_end_date: None,
            products: String::new(),
            trade_types: String::new(),
            limit_trade_types: String::new(),
            limits: OrderLimits::default(),
            costs: Vec::new(),
        }
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = App::new(vec![row(1, "Acme"), row(1, "Acme"), row(2, "Beta")], Vec::new());

        app.previous();
        assert_eq!(app.state.selected(), Some(2));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
        app.page_down();
        assert_eq!(app.state.selected(), Some(2));
        assert_eq!(app.client_count(), 2);
    }

    #[test]
    fn test_sessions_page_uses_own_selection() {
        let session = Session {
            id: 1,
            name: "Tokyo Day".to_string(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        };
        let mut app = App::new(vec![row(1, "Acme"), row(2, "Beta")], vec![session]);
        app.next_page();
        app.next_page();
        assert_eq!(app.current_page, Page::Sessions);

        app.next();
        assert_eq!(app.sessions_state.selected(), Some(0));
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_page_columns() {
        let clients = Page::Clients.columns();
        let limits = Page::Limits.columns();

        assert_eq!(clients.len() + limits.len(), COLUMNS.len() + 1);
        assert_eq!(limits[0], 0);
        assert!(truncate("Equity(DMA), Future(Disc), Option(DSA)", 10).ends_with("..."));
    }
}
