use crate::client::{
    AppSnapshot,
    PlayerRow,
    Tab,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use nova_admin::{
    RowHandle,
    catalog::{
        CatalogField,
        CatalogSection,
        ShopCatalog,
    },
    model::{
        MISSING,
        PlayerRecord,
        format_timestamp,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::{
    io::stdout,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    thread::JoinHandle,
    time::Duration,
};
use tokio::sync::mpsc;
use unicode_width::UnicodeWidthStr;

const GEAR_SLOTS: usize = 4;
const INPUT_POLL: Duration = Duration::from_millis(100);

pub enum UserEvent {
    Quit,
    Logout,
    Redraw,
    SwitchTab(Tab),
    Refresh,
    ToggleRow(RowHandle),
    ToggleRows(Vec<RowHandle>),
    ClearSelection,
    CycleSort,
    ToggleSortDirection,
    SetFilter(String),
    GrantDiamonds {
        amount: String,
    },
    EditCatalog {
        section: CatalogSection,
        row: usize,
        field: CatalogField,
        value: String,
    },
    SaveCatalog,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    tab: Tab,
    cursor: usize,
    visible: Vec<RowHandle>,
    catalog_cursor: CatalogCursor,
    catalog: Option<ShopCatalog>,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    GrantModal(InputState),
    FilterModal(InputState),
    CatalogEdit(CatalogEditState),
    QuitModal,
    LogoutModal,
}

/// Free-text line editor used by every modal.
#[derive(Clone, Debug, Default)]
struct InputState {
    value: String,
}

impl InputState {
    fn with_value(value: impl Into<String>) -> Self {
        InputState {
            value: value.into(),
        }
    }

    /// Returns false for keys the editor does not handle.
    fn edit(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Backspace => {
                self.value.pop();
                true
            }
            KeyCode::Char(c) if !c.is_control() => {
                self.value.push(c);
                true
            }
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct CatalogCursor {
    section_idx: usize,
    row: usize,
    field_idx: usize,
}

impl CatalogCursor {
    fn section(&self) -> CatalogSection {
        CatalogSection::ALL[self.section_idx % CatalogSection::ALL.len()]
    }

    fn field(&self) -> CatalogField {
        let fields = self.section().fields();
        fields[self.field_idx.min(fields.len() - 1)]
    }

    fn next_section(&mut self) {
        self.section_idx = (self.section_idx + 1) % CatalogSection::ALL.len();
        self.row = 0;
        self.field_idx = 0;
    }

    fn clamp(&mut self, catalog: Option<&ShopCatalog>) {
        let rows = catalog.map_or(0, |c| c.rows(self.section()));
        self.row = self.row.min(rows.saturating_sub(1));
        self.field_idx = self.field_idx.min(self.section().fields().len() - 1);
    }
}

#[derive(Clone, Debug)]
struct CatalogEditState {
    cursor: CatalogCursor,
    input: InputState,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // Create a single persistent Terminal to preserve buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

/// Terminal input read on a dedicated thread and handed to the async loop.
pub struct InputEventReceiver {
    receiver: mpsc::UnboundedReceiver<std::io::Result<Event>>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl InputEventReceiver {
    /// Stops the reader thread so it does not consume input meant for the login
    /// prompt.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.receiver.close();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for InputEventReceiver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn input_event_stream() -> InputEventReceiver {
    let (sender, receiver) = mpsc::unbounded_channel();
    let stop = Arc::new(AtomicBool::new(false));
    let reader_stop = stop.clone();
    let reader = std::thread::spawn(move || {
        while !reader_stop.load(Ordering::SeqCst) {
            match event::poll(INPUT_POLL) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(err) => {
                    let _ = sender.send(Err(err));
                    break;
                }
            }
            if reader_stop.load(Ordering::SeqCst) {
                break;
            }
            let event = event::read();
            let failed = event.is_err();
            if sender.send(event).is_err() || failed {
                break;
            }
        }
    });
    InputEventReceiver {
        receiver,
        stop,
        reader: Some(reader),
    }
}

pub async fn next_raw_event(input: &mut InputEventReceiver) -> Result<Event> {
    match input.receiver.recv().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input closed")),
    }
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    // keep the rows on screen for key handling
    state.tab = snap.tab;
    state.visible = snap
        .rows
        .iter()
        .map(|row| row.record.row_handle.clone())
        .collect();
    state.cursor = state.cursor.min(state.visible.len().saturating_sub(1));
    state.catalog = snap.catalog.clone();
    state.catalog_cursor.clamp(state.catalog.as_ref());
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Maps one terminal event to an action, updating modal state along the way.
pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let k = match event {
        Event::Key(k) => k,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if k.kind != KeyEventKind::Press {
        return None;
    }
    if is_ctrl_c(&k) {
        return Some(UserEvent::Quit);
    }
    match &mut state.mode {
        Mode::GrantModal(input) => {
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => {
                    let amount = input.value.clone();
                    state.mode = Mode::Normal;
                    Some(UserEvent::GrantDiamonds { amount })
                }
                code => input.edit(code).then_some(UserEvent::Redraw),
            };
        }
        Mode::FilterModal(input) => {
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => {
                    let filter = input.value.trim().to_string();
                    state.mode = Mode::Normal;
                    state.cursor = 0;
                    Some(UserEvent::SetFilter(filter))
                }
                code => input.edit(code).then_some(UserEvent::Redraw),
            };
        }
        Mode::CatalogEdit(edit) => {
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => {
                    let cursor = edit.cursor;
                    let value = edit.input.value.clone();
                    state.mode = Mode::Normal;
                    Some(UserEvent::EditCatalog {
                        section: cursor.section(),
                        row: cursor.row,
                        field: cursor.field(),
                        value,
                    })
                }
                code => edit.input.edit(code).then_some(UserEvent::Redraw),
            };
        }
        Mode::QuitModal => {
            return match k.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::LogoutModal => {
            return match k.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Logout),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Normal => {}
    }

    match k.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            return Some(UserEvent::Redraw);
        }
        KeyCode::Char('L') => {
            state.mode = Mode::LogoutModal;
            return Some(UserEvent::Redraw);
        }
        KeyCode::Tab => {
            let next = match state.tab {
                Tab::Dashboard => Tab::Functions,
                Tab::Functions => Tab::Dashboard,
            };
            state.tab = next;
            return Some(UserEvent::SwitchTab(next));
        }
        KeyCode::Char('1') if state.tab != Tab::Dashboard => {
            state.tab = Tab::Dashboard;
            return Some(UserEvent::SwitchTab(Tab::Dashboard));
        }
        KeyCode::Char('2') if state.tab != Tab::Functions => {
            state.tab = Tab::Functions;
            return Some(UserEvent::SwitchTab(Tab::Functions));
        }
        KeyCode::Char('r') => return Some(UserEvent::Refresh),
        _ => {}
    }

    match state.tab {
        Tab::Dashboard => dashboard_key(state, k.code),
        Tab::Functions => functions_key(state, k.code),
    }
}

fn is_ctrl_c(k: &KeyEvent) -> bool {
    k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c')
}

fn dashboard_key(state: &mut UiState, code: KeyCode) -> Option<UserEvent> {
    match code {
        KeyCode::Up | KeyCode::Char('k') => {
            state.cursor = state.cursor.saturating_sub(1);
            Some(UserEvent::Redraw)
        }
        KeyCode::Down | KeyCode::Char('j') => {
            let max = state.visible.len().saturating_sub(1);
            state.cursor = (state.cursor + 1).min(max);
            Some(UserEvent::Redraw)
        }
        KeyCode::PageUp => {
            state.cursor = state.cursor.saturating_sub(10);
            Some(UserEvent::Redraw)
        }
        KeyCode::PageDown => {
            let max = state.visible.len().saturating_sub(1);
            state.cursor = (state.cursor + 10).min(max);
            Some(UserEvent::Redraw)
        }
        KeyCode::Char(' ') => state
            .visible
            .get(state.cursor)
            .cloned()
            .map(UserEvent::ToggleRow),
        KeyCode::Char('a') => Some(UserEvent::ToggleRows(state.visible.clone())),
        KeyCode::Char('x') => Some(UserEvent::ClearSelection),
        KeyCode::Char('s') => Some(UserEvent::CycleSort),
        KeyCode::Char('d') => Some(UserEvent::ToggleSortDirection),
        KeyCode::Char('/') => {
            state.mode = Mode::FilterModal(InputState::default());
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('g') => {
            state.mode = Mode::GrantModal(InputState::default());
            Some(UserEvent::Redraw)
        }
        _ => None,
    }
}

fn functions_key(state: &mut UiState, code: KeyCode) -> Option<UserEvent> {
    let cursor = &mut state.catalog_cursor;
    match code {
        KeyCode::Up | KeyCode::Char('k') => {
            cursor.row = cursor.row.saturating_sub(1);
        }
        KeyCode::Down | KeyCode::Char('j') => {
            cursor.row += 1;
        }
        KeyCode::Left | KeyCode::Char('h') => {
            cursor.field_idx = cursor.field_idx.saturating_sub(1);
        }
        KeyCode::Right | KeyCode::Char('l') => {
            cursor.field_idx += 1;
        }
        KeyCode::Char('n') => cursor.next_section(),
        KeyCode::Enter | KeyCode::Char('e') => {
            let catalog = state.catalog.as_ref()?;
            cursor.clamp(Some(catalog));
            let current =
                catalog.field_value(cursor.section(), cursor.row, cursor.field())?;
            state.mode = Mode::CatalogEdit(CatalogEditState {
                cursor: *cursor,
                input: InputState::with_value(current),
            });
        }
        KeyCode::Char('w') => return Some(UserEvent::SaveCatalog),
        _ => return None,
    }
    state.catalog_cursor.clamp(state.catalog.as_ref());
    Some(UserEvent::Redraw)
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    // Clear the whole frame to avoid leftover fragments
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // tabs
            Constraint::Min(10),   // tab body
            Constraint::Length(4), // status/errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_tabs(f, chunks[0], snap);
    match snap.tab {
        Tab::Dashboard => draw_dashboard(f, state, chunks[1], snap),
        Tab::Functions => draw_functions(f, state, chunks[1], snap),
    }
    draw_status(f, chunks[2], snap);
    draw_help(f, chunks[3], snap);
    draw_modals(f, state, snap);
}

fn draw_tabs(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let selected = match snap.tab {
        Tab::Dashboard => 0,
        Tab::Functions => 1,
    };
    let tabs = Tabs::new(vec!["1 Dashboard", "2 Functions"])
        .select(selected)
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Nova Admin | {}", snap.api_url)),
        );
    f.render_widget(tabs, area);
}

fn draw_dashboard(f: &mut Frame, state: &UiState, area: Rect, snap: &AppSnapshot) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // totals
            Constraint::Min(5),    // grid
            Constraint::Length(8), // details
        ])
        .split(area);
    draw_totals(f, chunks[0], snap);
    draw_grid(f, state, chunks[1], snap);
    draw_details(f, chunks[2], snap.rows.get(state.cursor));
}

fn draw_totals(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let filter = if snap.filter.is_empty() {
        "none"
    } else {
        snap.filter.as_str()
    };
    let text = format!(
        "Total Users: {} | Package D1: {} | Package D2: {} | Package D3: {} | Selected: {} | Sort: {} {} | Filter: {}",
        snap.totals.total_users,
        snap.totals.package_d1,
        snap.totals.package_d2,
        snap.totals.package_d3,
        snap.selected_count,
        snap.sort.label(),
        snap.direction.arrow(),
        filter,
    );
    let widget =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Totals"));
    f.render_widget(widget, area);
}

fn draw_grid(f: &mut Frame, state: &UiState, area: Rect, snap: &AppSnapshot) {
    let mut title = format!("Players ({})", snap.rows.len());
    if snap.loading {
        title.push_str(" loading...");
    }
    if snap.grant_pending {
        title.push_str(" granting...");
    }
    let block = Block::default().borders(Borders::ALL).title(title);
    if snap.rows.is_empty() {
        let empty = if snap.loading {
            "Loading players..."
        } else {
            "No players"
        };
        let p = Paragraph::new(Line::styled(empty, Style::default().fg(Color::DarkGray)))
            .block(block);
        f.render_widget(p, area);
        return;
    }

    let mut header = vec![
        "", "Telegram ID", "Name", "Power", "Coins", "Diamonds", "Level", "Energy",
    ];
    let gear_headers = ["Gear 1", "Gear 2", "Gear 3", "Gear 4"];
    header.extend(gear_headers.iter().take(GEAR_SLOTS));
    header.extend(["Wallet", "D1", "D2", "D3", "Referral", "Refs"]);

    let rows = snap.rows.iter().enumerate().map(|(i, row)| {
        let record = &row.record;
        let mut cells = vec![
            if row.selected { "[x]" } else { "[ ]" }.to_string(),
            record.telegram_id.to_string(),
            record.first_name_label().to_string(),
            record.power.to_string(),
            record.coins.to_string(),
            record.diamonds.to_string(),
            record.level.to_string(),
            record.energy.to_string(),
        ];
        cells.extend((0..GEAR_SLOTS).map(|slot| record.gear_level_label(slot)));
        cells.extend([
            record.wallet_balance.to_string(),
            record.package_d1.to_string(),
            record.package_d2.to_string(),
            record.package_d3.to_string(),
            record.referral_code_label().to_string(),
            record.referral_count.to_string(),
        ]);
        let style = if i == state.cursor {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else if row.selected {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };
        Row::new(cells).style(style)
    });

    let mut widths = vec![
        Constraint::Length(3),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(8),
        Constraint::Length(10),
        Constraint::Length(9),
        Constraint::Length(6),
        Constraint::Length(7),
    ];
    widths.extend(std::iter::repeat_n(Constraint::Length(6), GEAR_SLOTS));
    widths.extend([
        Constraint::Length(8),
        Constraint::Length(4),
        Constraint::Length(4),
        Constraint::Length(4),
        Constraint::Length(10),
        Constraint::Length(5),
    ]);

    let table = Table::new(rows, widths)
        .header(
            Row::new(header).style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
        )
        .block(block);
    let mut table_state = TableState::default().with_selected(Some(state.cursor));
    f.render_stateful_widget(table, area, &mut table_state);
}

fn draw_details(f: &mut Frame, area: Rect, row: Option<&PlayerRow>) {
    let block = Block::default().borders(Borders::ALL).title("Player");
    let Some(row) = row else {
        f.render_widget(Paragraph::new(MISSING).block(block), area);
        return;
    };
    let record = &row.record;
    let mut lines = vec![Line::from(format!(
        "{} ({}) | Address: {} | Max Energy: {}",
        record.first_name_label(),
        record.telegram_id,
        record.public_address_label(),
        record.max_energy_cap
    ))];
    lines.push(Line::from(gear_summary(record)));
    lines.push(Line::from(format!(
        "Coin Pack: {} (last {}) | Energy Pack: {} (last {})",
        record.coin_pack.count,
        format_timestamp(record.coin_pack.last_purchase.as_ref()),
        record.energy_pack.count,
        format_timestamp(record.energy_pack.last_purchase.as_ref()),
    )));
    lines.push(Line::from(format!(
        "Referral Code: {} | Referred By: {} | Referrals: {}",
        record.referral_code_label(),
        record.referred_by_label(),
        record.referrals_label()
    )));
    lines.push(Line::from(format!(
        "Milestones: {}",
        record.milestones_label()
    )));
    let p = Paragraph::new(lines).wrap(Wrap { trim: false }).block(block);
    f.render_widget(p, area);
}

fn gear_summary(record: &PlayerRecord) -> String {
    let parts: Vec<String> = (0..GEAR_SLOTS)
        .map(|slot| {
            format!(
                "G{} lvl {} ({})",
                slot + 1,
                record.gear_level_label(slot),
                record.gear_last_level_up_label(slot)
            )
        })
        .collect();
    parts.join(" | ")
}

fn draw_functions(f: &mut Frame, state: &UiState, area: Rect, snap: &AppSnapshot) {
    let Some(catalog) = snap.catalog.as_ref() else {
        let text = if snap.catalog_loading {
            "Loading shop catalog..."
        } else {
            "Shop catalog not loaded (r to retry)"
        };
        let p = Paragraph::new(Line::styled(text, Style::default().fg(Color::DarkGray)))
            .block(Block::default().borders(Borders::ALL).title("Functions"));
        f.render_widget(p, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(area);

    for (i, section) in CatalogSection::ALL.into_iter().enumerate() {
        let focused = state.catalog_cursor.section() == section;
        let mut title = section.title().to_string();
        if snap.catalog_dirty && focused {
            title.push_str(" [unsaved]");
        }
        if snap.save_pending && focused {
            title.push_str(" [saving...]");
        }
        let border_style = if focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title);

        let fields = section.fields();
        let mut header = vec![Span::raw(pad("ID", 8))];
        header.extend(
            fields
                .iter()
                .map(|field| Span::raw(pad(field.label(), 14))),
        );
        let mut lines = vec![Line::from(header).style(Style::default().fg(Color::Cyan))];
        let rows = catalog.rows(section);
        if rows == 0 {
            lines.push(Line::from("None"));
        }
        for row in 0..rows {
            let id = catalog
                .item_id(section, row)
                .map(|id| id.to_string())
                .unwrap_or_else(|| MISSING.to_string());
            let mut spans = vec![Span::raw(pad(&id, 8))];
            for field in fields {
                let value = catalog
                    .field_value(section, row, *field)
                    .unwrap_or_else(|| MISSING.to_string());
                let cell_focused = focused
                    && state.catalog_cursor.row == row
                    && state.catalog_cursor.field() == *field;
                let style = if cell_focused {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Yellow)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                spans.push(Span::styled(pad(&value, 14), style));
            }
            lines.push(Line::from(spans));
        }
        f.render_widget(Paragraph::new(lines).block(block), chunks[i]);
    }
}

/// Left-aligns `text` in a column `width` cells wide, truncating if needed.
fn pad(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.to_string().width();
        if used + w >= width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push_str(&" ".repeat(width - used));
    out
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let status_widget = if snap.errors.is_empty() {
        let mut lines: Vec<Line> = Vec::new();
        if snap.status.trim().is_empty() {
            lines.push(Line::from("Ready"));
        } else {
            for line in snap.status.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        for e in &snap.errors {
            lines.push(Line::from(e.clone()));
        }
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(status_widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let text = match snap.tab {
        Tab::Dashboard => {
            "↑/↓ move | space select | a select all | x clear | g grant diamonds | / filter | s sort | d direction | r refresh | Tab switch | L logout | q quit"
        }
        Tab::Functions => {
            "↑/↓ row | ←/→ field | n next table | Enter edit | w save | r reload | Tab switch | L logout | q quit"
        }
    };
    let help = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    match &state.mode {
        Mode::GrantModal(input) => {
            let area = centered_rect(50, 30, f.area());
            let block = Block::default()
                .borders(Borders::ALL)
                .title("Grant Diamonds");
            let p = Paragraph::new(format!(
                "Selected players: {}\nAmount: {}_\nEnter=confirm Esc=cancel",
                snap.selected_count, input.value
            ));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::FilterModal(input) => {
            let area = centered_rect(50, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Filter");
            let p = Paragraph::new(format!(
                "Telegram ID, name or referral code: {}_\nEnter=apply (empty clears) Esc=cancel",
                input.value
            ));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::CatalogEdit(edit) => {
            let area = centered_rect(50, 20, f.area());
            let block = Block::default()
                .borders(Borders::ALL)
                .title(format!("Edit {}", edit.cursor.section().title()));
            let p = Paragraph::new(format!(
                "Row {} {}: {}_\nEnter=confirm Esc=cancel",
                edit.cursor.row + 1,
                edit.cursor.field().label(),
                edit.input.value
            ));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit the console? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::LogoutModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default()
                .borders(Borders::ALL)
                .title("Confirm Logout");
            let p = Paragraph::new("Log out and forget the stored session? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(state: &mut UiState, text: &str) {
        for c in text.chars() {
            interpret_event(state, key(KeyCode::Char(c)));
        }
    }

    fn dashboard_state(handles: &[&str]) -> UiState {
        UiState {
            visible: handles.iter().map(|h| RowHandle::new(*h)).collect(),
            ..UiState::default()
        }
    }

    #[test]
    fn interpret_event__space_toggles_row_under_cursor() {
        // given
        let mut state = dashboard_state(&["r1", "r2"]);
        interpret_event(&mut state, key(KeyCode::Down));

        // when
        let event = interpret_event(&mut state, key(KeyCode::Char(' ')));

        // then
        assert!(matches!(
            event,
            Some(UserEvent::ToggleRow(handle)) if handle == RowHandle::new("r2")
        ));
    }

    #[test]
    fn interpret_event__select_all_targets_visible_rows() {
        let mut state = dashboard_state(&["r1", "r2"]);
        let event = interpret_event(&mut state, key(KeyCode::Char('a')));
        assert!(matches!(
            event,
            Some(UserEvent::ToggleRows(handles)) if handles.len() == 2
        ));
    }

    #[test]
    fn interpret_event__grant_modal_submits_raw_amount_text() {
        // given
        let mut state = dashboard_state(&["r1"]);
        interpret_event(&mut state, key(KeyCode::Char('g')));
        type_text(&mut state, "1x5");
        interpret_event(&mut state, key(KeyCode::Backspace));

        // when
        let event = interpret_event(&mut state, key(KeyCode::Enter));

        // then
        assert!(matches!(
            event,
            Some(UserEvent::GrantDiamonds { amount }) if amount == "1x"
        ));
        assert!(matches!(state.mode, Mode::Normal));
    }

    #[test]
    fn interpret_event__quit_requires_confirmation() {
        // given
        let mut state = UiState::default();

        // when
        let first = interpret_event(&mut state, key(KeyCode::Char('q')));
        let second = interpret_event(&mut state, key(KeyCode::Char('y')));

        // then
        assert!(matches!(first, Some(UserEvent::Redraw)));
        assert!(matches!(second, Some(UserEvent::Quit)));
    }

    #[test]
    fn interpret_event__tab_switches_to_functions() {
        let mut state = UiState::default();
        let event = interpret_event(&mut state, key(KeyCode::Tab));
        assert!(matches!(event, Some(UserEvent::SwitchTab(Tab::Functions))));
    }

    #[test]
    fn interpret_event__catalog_edit_prefills_and_submits_field() {
        // given
        let catalog: ShopCatalog = serde_json::from_value(serde_json::json!({
            "packages": [{ "id": 7, "name": "Starter", "etherValue": 0.5, "diamondAdd": 10 }]
        }))
        .unwrap();
        let mut state = UiState {
            tab: Tab::Functions,
            catalog: Some(catalog),
            ..UiState::default()
        };
        interpret_event(&mut state, key(KeyCode::Char('n')));
        interpret_event(&mut state, key(KeyCode::Char('n')));
        interpret_event(&mut state, key(KeyCode::Right));

        // when
        interpret_event(&mut state, key(KeyCode::Enter));
        type_text(&mut state, "5");
        let event = interpret_event(&mut state, key(KeyCode::Enter));

        // then
        assert!(matches!(
            event,
            Some(UserEvent::EditCatalog {
                section: CatalogSection::Packages,
                row: 0,
                field: CatalogField::EtherValue,
                value,
            }) if value == "0.55"
        ));
    }

    #[test]
    fn pad__truncates_and_fills_to_width() {
        assert_eq!(pad("abc", 6), "abc   ");
        assert_eq!(pad("abcdefgh", 5), "abcd ");
    }
}
