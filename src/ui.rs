use crate::client::{
    AppSnapshot,
    Screen,
};
use betlink::{
    bets::{
        BetStatus,
        BetView,
        DashboardTab,
    },
    fetch::{
        ListState,
        RetryPolicy,
    },
    format::{
        format_address,
        short_address,
    },
    mutations::{
        CreateBetForm,
        Winner,
    },
    session::Phase,
};
use color_eyre::eyre::{
    Report,
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
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use itertools::Itertools;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use tokio::sync::mpsc;
use unicode_width::{
    UnicodeWidthChar,
    UnicodeWidthStr,
};

const TITLE_WIDTH: usize = 36;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    SwitchScreen(Screen),
    SelectNext,
    SelectPrev,
    SearchChanged(String),
    CycleCategory,
    NextTab,
    Connect { password: String },
    Disconnect,
    NextWallet,
    Join,
    Resolve(Winner),
    CheckExpiry,
    Reload,
    SubmitCreate(CreateBetForm),
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<Result<Event>>;

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    search: String,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

impl UiState {
    pub fn form_open(&self) -> bool {
        matches!(self.mode, Mode::CreateForm(_))
    }

    pub fn close_form(&mut self) {
        if self.form_open() {
            self.mode = Mode::Normal;
        }
    }
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    Search(String),
    Password(String),
    ResolveModal(Winner),
    CreateForm(FormState),
    QuitModal,
}

#[derive(Clone, Debug, Default)]
struct FormState {
    form: CreateBetForm,
    focus: usize,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

/// Reads terminal events on a dedicated thread so the run loop can select on them.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read().map_err(Report::from);
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(rx: &mut InputEventReceiver) -> Result<Event> {
    match rx.recv().await {
        Some(event) => event,
        None => Err(eyre!("terminal input stream closed")),
    }
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    state.search = snap.search.clone();
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    match event {
        Event::Key(k) if k.kind == KeyEventKind::Press => interpret_key(state, k),
        Event::Resize(_, _) => Some(UserEvent::Redraw),
        _ => None,
    }
}

fn interpret_key(state: &mut UiState, k: KeyEvent) -> Option<UserEvent> {
    match &mut state.mode {
        Mode::Search(buffer) => {
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::SearchChanged(String::new()))
                }
                KeyCode::Enter => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Backspace => {
                    buffer.pop();
                    Some(UserEvent::SearchChanged(buffer.clone()))
                }
                KeyCode::Char(c) => {
                    buffer.push(c);
                    Some(UserEvent::SearchChanged(buffer.clone()))
                }
                _ => None,
            };
        }
        Mode::Password(buffer) => {
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => {
                    let password = std::mem::take(buffer);
                    state.mode = Mode::Normal;
                    Some(UserEvent::Connect { password })
                }
                KeyCode::Backspace => {
                    buffer.pop();
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char(c) => {
                    buffer.push(c);
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::ResolveModal(winner) => {
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Left | KeyCode::Right | KeyCode::Tab => {
                    *winner = winner.toggle();
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => {
                    let winner = *winner;
                    state.mode = Mode::Normal;
                    Some(UserEvent::Resolve(winner))
                }
                _ => None,
            };
        }
        Mode::CreateForm(fs) => {
            let last = CreateBetForm::FIELDS.len() - 1;
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Tab | KeyCode::Down => {
                    fs.focus = if fs.focus >= last { 0 } else { fs.focus + 1 };
                    Some(UserEvent::Redraw)
                }
                KeyCode::BackTab | KeyCode::Up => {
                    fs.focus = if fs.focus == 0 { last } else { fs.focus - 1 };
                    Some(UserEvent::Redraw)
                }
                KeyCode::Backspace => {
                    if let Some(field) = fs.form.field_mut(fs.focus) {
                        field.pop();
                    }
                    Some(UserEvent::Redraw)
                }
                // stays open until the controller reports success
                KeyCode::Enter => Some(UserEvent::SubmitCreate(fs.form.clone())),
                KeyCode::Char(c) => {
                    if let Some(field) = fs.form.field_mut(fs.focus) {
                        field.push(c);
                    }
                    Some(UserEvent::Redraw)
                }
                _ => None,
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
        Mode::Normal => {}
    }

    Some(match k.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            UserEvent::Redraw
        }
        KeyCode::Char('1') => UserEvent::SwitchScreen(Screen::Explore),
        KeyCode::Char('2') => UserEvent::SwitchScreen(Screen::Resolve),
        KeyCode::Char('3') => UserEvent::SwitchScreen(Screen::Dashboard),
        KeyCode::Down => UserEvent::SelectNext,
        KeyCode::Up => UserEvent::SelectPrev,
        KeyCode::Char('/') => {
            state.mode = Mode::Search(state.search.clone());
            UserEvent::Redraw
        }
        KeyCode::Char('c') => UserEvent::CycleCategory,
        KeyCode::Tab => UserEvent::NextTab,
        KeyCode::Char('n') => {
            state.mode = Mode::CreateForm(FormState::default());
            UserEvent::Redraw
        }
        KeyCode::Char('w') => {
            state.mode = Mode::Password(String::new());
            UserEvent::Redraw
        }
        KeyCode::Char('d') => UserEvent::Disconnect,
        KeyCode::Char('k') => UserEvent::NextWallet,
        KeyCode::Char('j') => UserEvent::Join,
        KeyCode::Char('r') => {
            state.mode = Mode::ResolveModal(Winner::Creator);
            UserEvent::Redraw
        }
        KeyCode::Char('x') => UserEvent::CheckExpiry,
        KeyCode::Char('u') => UserEvent::Reload,
        _ => return None,
    })
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let overview_height = if snap.screen == Screen::Dashboard { 3 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),               // wallet
            Constraint::Length(3),               // screens + filters
            Constraint::Length(overview_height), // portfolio
            Constraint::Min(6),                  // bets
            Constraint::Length(6),               // status/errors
            Constraint::Length(3),               // help
        ])
        .split(f.area());

    draw_wallet_panel(f, chunks[0], snap);
    draw_nav(f, chunks[1], state, snap);
    if snap.screen == Screen::Dashboard {
        draw_portfolio(f, chunks[2], snap);
    }
    draw_bets(f, chunks[3], snap);
    draw_status(f, chunks[4], snap);
    draw_help(f, chunks[5], snap);
    draw_modals(f, state, snap);
}

fn draw_wallet_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let session = &snap.session;
    let account = session
        .account
        .map(|a| format_address(&short_address(a)))
        .unwrap_or_else(|| "-".to_string());
    let phase = match session.phase {
        Phase::Disconnected => "Disconnected",
        Phase::Connecting => "Connecting...",
        Phase::Connected => "Connected",
        Phase::Disconnecting => "Disconnecting...",
    };
    let wallet = snap.wallet_name.as_deref().unwrap_or("none");
    let text = format!(
        "{} | Network: {} | Account: {} | Balance: {} ETH | Keystore: {}",
        phase, session.network_name, account, session.balance, wallet
    );
    let style = if session.is_connected() {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    };
    let widget = Paragraph::new(text)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(widget, area);
}

fn draw_nav(f: &mut Frame, area: Rect, state: &UiState, snap: &AppSnapshot) {
    let screens = Screen::ALL
        .iter()
        .enumerate()
        .map(|(i, s)| {
            if *s == snap.screen {
                format!("[{} {}]", i + 1, s.label())
            } else {
                format!(" {} {} ", i + 1, s.label())
            }
        })
        .join(" ");
    let detail = match snap.screen {
        Screen::Dashboard => DashboardTab::ALL
            .iter()
            .map(|t| {
                if *t == snap.tab {
                    format!("<{}>", t.label())
                } else {
                    t.label().to_string()
                }
            })
            .join(" "),
        Screen::Explore | Screen::Resolve => {
            let search = match &state.mode {
                Mode::Search(buffer) => format!("{buffer}_"),
                _ if snap.search.is_empty() => "-".to_string(),
                _ => snap.search.clone(),
            };
            format!("Search: {} | Category: {}", search, snap.category.label())
        }
    };
    let widget = Paragraph::new(format!("{screens}   {detail}"))
        .block(Block::default().borders(Borders::ALL).title("Screens"));
    f.render_widget(widget, area);
}

fn draw_portfolio(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let text = match snap.list.portfolio() {
        Some(p) => format!(
            "Locked: {} ETH | Winnings: {} ETH | Open bets: {} | Bets won: {}",
            p.locked_display(),
            p.winnings_display(),
            p.open_count,
            p.won_count
        ),
        None if snap.session.is_connected() => "Loading portfolio...".to_string(),
        None => "Connect a wallet to see your portfolio".to_string(),
    };
    let widget = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Portfolio"));
    f.render_widget(widget, area);
}

fn draw_bets(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let title = format!("{} bets", snap.screen.label());
    let block = Block::default().borders(Borders::ALL).title(title);

    let placeholder = match &snap.list {
        ListState::Loading => Some(("Loading bets...".to_string(), Color::Yellow)),
        ListState::Retrying { attempt, .. } => Some((
            RetryPolicy::default().retry_message(*attempt),
            Color::Yellow,
        )),
        ListState::Failed { message } => Some((message.clone(), Color::Red)),
        ListState::Ready(_) if snap.rows.is_empty() => {
            Some((empty_message(snap).to_string(), Color::Gray))
        }
        ListState::Ready(_) => None,
    };
    if let Some((text, color)) = placeholder {
        let widget = Paragraph::new(text)
            .style(Style::default().fg(color))
            .wrap(Wrap { trim: false })
            .block(block);
        f.render_widget(widget, area);
        return;
    }

    let header = Row::new(["#", "Title", "Stake", "Expires", "Status", "Takers", "Role"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let rows = snap.rows.iter().map(|bet| bet_row(bet, snap.now));
    let widths = [
        Constraint::Length(5),
        Constraint::Min(20),
        Constraint::Length(12),
        Constraint::Length(11),
        Constraint::Length(9),
        Constraint::Length(7),
        Constraint::Length(9),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .row_highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");
    let mut table_state = TableState::default().with_selected(Some(snap.selected));
    f.render_stateful_widget(table, area, &mut table_state);
}

fn bet_row(bet: &BetView, now: u64) -> Row<'static> {
    let expires = if bet.is_expired(now) && !bet.status.is_settled() {
        format!("{}*", bet.expires_on)
    } else {
        bet.expires_on.clone()
    };
    let status_color = match bet.status {
        BetStatus::Open => Color::Green,
        BetStatus::Joined => Color::Yellow,
        BetStatus::Resolved => Color::Blue,
        BetStatus::Unknown(_) => Color::Gray,
    };
    Row::new(vec![
        Cell::from(bet.id.to_string()),
        Cell::from(truncate_to_width(&bet.title, TITLE_WIDTH)),
        Cell::from(format!("{} ETH", bet.stake_display)),
        Cell::from(expires),
        Cell::from(bet.status.label()).style(Style::default().fg(status_color)),
        Cell::from(format!("{}/1", bet.takers)),
        Cell::from(bet.role.label()),
    ])
}

fn empty_message(snap: &AppSnapshot) -> &'static str {
    match snap.screen {
        Screen::Explore if !snap.search.is_empty() => "No bets match your search",
        Screen::Explore => "No active bets",
        Screen::Resolve => "No bets awaiting resolution",
        Screen::Dashboard if !snap.session.is_connected() => {
            "Connect a wallet to see your bets"
        }
        Screen::Dashboard => "No bets in this tab",
    }
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
        let lines: Vec<Line> = snap.errors.iter().map(|e| Line::from(e.clone())).collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(status_widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut keys = vec!["1/2/3 screens", "↑/↓ select"];
    match snap.screen {
        Screen::Explore => keys.extend(["/ search", "c category", "j join"]),
        Screen::Resolve => keys.extend(["/ search", "c category", "r resolve"]),
        Screen::Dashboard => keys.extend(["Tab tab", "x expiry check"]),
    }
    keys.extend(["n new bet", "u reload"]);
    if snap.session.is_connected() {
        keys.push("d disconnect");
    } else {
        keys.extend(["w connect", "k keystore"]);
    }
    keys.push("q/Esc quit");
    let help = Paragraph::new(keys.iter().join(" | "))
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    match &state.mode {
        Mode::Password(buffer) => {
            let area = centered_rect(50, 20, f.area());
            let wallet = snap.wallet_name.as_deref().unwrap_or("(no keystore)");
            let block = Block::default()
                .borders(Borders::ALL)
                .title(format!("Unlock {wallet}"));
            let lines = vec![
                Line::from("Enter the keystore password to connect."),
                Line::from(format!("Password: {}", "*".repeat(buffer.chars().count()))),
                Line::from("Enter: connect  Esc: cancel"),
            ];
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::ResolveModal(winner) => {
            let area = centered_rect(50, 30, f.area());
            let block = Block::default().borders(Borders::ALL).title("Resolve Bet");
            let mut lines = Vec::new();
            match snap.rows.get(snap.selected) {
                Some(bet) => {
                    lines.push(Line::from(format!("#{} {}", bet.id, bet.title)));
                    let joiner = bet
                        .joiner
                        .map(short_address)
                        .map(|a| format_address(&a))
                        .unwrap_or_else(|| "-".to_string());
                    for (choice, who) in [
                        (Winner::Creator, format_address(&short_address(bet.creator))),
                        (Winner::Joiner, joiner),
                    ] {
                        let marker = if choice == *winner { ">" } else { " " };
                        let style = if choice == *winner {
                            Style::default().fg(Color::Black).bg(Color::Yellow)
                        } else {
                            Style::default()
                        };
                        lines.push(Line::styled(
                            format!("{marker} {}: {who}", choice.label()),
                            style,
                        ));
                    }
                }
                None => lines.push(Line::from("No bet selected")),
            }
            lines.push(Line::from("←/→ choose winner  Enter: resolve  Esc: cancel"));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::CreateForm(fs) => {
            let area = centered_rect(60, 50, f.area());
            let block = Block::default().borders(Borders::ALL).title("Create Bet");
            let mut lines: Vec<Line> = CreateBetForm::FIELDS
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    let value = fs.form.field(i);
                    if i == fs.focus {
                        Line::styled(
                            format!("> {label}: {value}_"),
                            Style::default().fg(Color::Yellow),
                        )
                    } else {
                        Line::from(format!("  {label}: {value}"))
                    }
                })
                .collect();
            lines.push(Line::from(""));
            lines.push(Line::from("Tab/↑/↓ field  Enter: submit  Esc: cancel"));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(
                Paragraph::new(lines).wrap(Wrap { trim: false }),
                block.inner(area),
            );
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit betlink? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal | Mode::Search(_) => {}
    }
}

fn truncate_to_width(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
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
    use crossterm::event::KeyModifiers;

    fn press(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(state: &mut UiState, text: &str) -> Vec<UserEvent> {
        text.chars()
            .filter_map(|c| interpret_event(state, press(KeyCode::Char(c))))
            .collect()
    }

    #[test]
    fn interpret_event__search_keystrokes__emit_each_query() {
        // given
        let mut state = UiState::default();
        interpret_event(&mut state, press(KeyCode::Char('/')));

        // when
        let events = type_text(&mut state, "btc");

        // then
        assert_eq!(
            events,
            vec![
                UserEvent::SearchChanged("b".to_string()),
                UserEvent::SearchChanged("bt".to_string()),
                UserEvent::SearchChanged("btc".to_string()),
            ]
        );
    }

    #[test]
    fn interpret_event__password_enter__emits_connect_and_clears_buffer() {
        // given
        let mut state = UiState::default();
        interpret_event(&mut state, press(KeyCode::Char('w')));
        type_text(&mut state, "hunter2");

        // when
        let event = interpret_event(&mut state, press(KeyCode::Enter));

        // then
        assert_eq!(
            event,
            Some(UserEvent::Connect {
                password: "hunter2".to_string()
            })
        );
        assert!(matches!(state.mode, Mode::Normal));
    }

    #[test]
    fn interpret_event__create_form_submit__stays_open_until_closed() {
        // given
        let mut state = UiState::default();
        interpret_event(&mut state, press(KeyCode::Char('n')));
        type_text(&mut state, "BTC 100k");
        interpret_event(&mut state, press(KeyCode::Tab));
        type_text(&mut state, "by June");

        // when
        let event = interpret_event(&mut state, press(KeyCode::Enter));

        // then
        let Some(UserEvent::SubmitCreate(form)) = event else {
            panic!("expected a submit event, got {event:?}");
        };
        assert_eq!(form.title, "BTC 100k");
        assert_eq!(form.description, "by June");
        assert!(state.form_open());
        state.close_form();
        assert!(!state.form_open());
    }

    #[test]
    fn interpret_event__resolve_modal_toggle__picks_joiner() {
        // given
        let mut state = UiState::default();
        interpret_event(&mut state, press(KeyCode::Char('r')));

        // when
        interpret_event(&mut state, press(KeyCode::Right));
        let event = interpret_event(&mut state, press(KeyCode::Enter));

        // then
        assert_eq!(event, Some(UserEvent::Resolve(Winner::Joiner)));
    }

    #[test]
    fn interpret_event__quit_needs_confirmation() {
        // given
        let mut state = UiState::default();

        // when
        let first = interpret_event(&mut state, press(KeyCode::Char('q')));
        let second = interpret_event(&mut state, press(KeyCode::Char('y')));

        // then
        assert_eq!(first, Some(UserEvent::Redraw));
        assert_eq!(second, Some(UserEvent::Quit));
    }

    #[test]
    fn truncate_to_width__wide_chars__respects_display_width() {
        // given
        let title = "日本語のタイトル";

        // when
        let short = truncate_to_width(title, 7);

        // then
        assert!(short.width() <= 7);
        assert!(short.ends_with('…'));
        assert_eq!(truncate_to_width("short", 7), "short");
    }
}
