use std::{
    collections::HashMap,
    io, thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tycoon_core::{
    ledger::display_amount, GameSession, Hint, KeyInput, KeyOutcome, LedgerError, MatchEvent,
    MatchState, Persistence, StartReport,
};

const LOT_ROWS: usize = 3;
const LOT_COLS: usize = 8;
const FLASH_DURATION: Duration = Duration::from_millis(600);
const ITEM_COLORS: [Color; 6] = [
    Color::Green,
    Color::Yellow,
    Color::Red,
    Color::Cyan,
    Color::Magenta,
    Color::Blue,
];

#[derive(Debug)]
enum AppEvent {
    Input(Event),
    Tick,
}

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    success: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            success: Color::Green,
            danger: Color::Red,
        }
    }
}

/// Grid of plots where constructions are placed, filled row by row and
/// wrapping back to the first plot once full.
#[derive(Debug, Clone)]
struct Lot {
    rows: usize,
    cols: usize,
    next: (usize, usize),
    plots: HashMap<(usize, usize), usize>,
    flash: Option<((usize, usize), Instant)>,
}

impl Lot {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows: rows.max(1),
            cols: cols.max(1),
            next: (0, 0),
            plots: HashMap::new(),
            flash: None,
        }
    }

    fn place(&mut self, item_index: usize) -> (usize, usize) {
        let plot = self.next;
        self.plots.insert(plot, item_index);

        let (mut row, mut col) = plot;
        col += 1;
        if col >= self.cols {
            col = 0;
            row += 1;
            if row >= self.rows {
                row = 0;
            }
        }
        self.next = (row, col);
        plot
    }

    fn place_flashing(&mut self, item_index: usize, now: Instant) {
        let plot = self.place(item_index);
        self.flash = Some((plot, now));
    }

    fn is_flashing(&self, plot: (usize, usize), now: Instant) -> bool {
        matches!(self.flash, Some((flashing, since)) if flashing == plot && now.duration_since(since) < FLASH_DURATION)
    }
}

pub struct TycoonApp<P> {
    session: GameSession<P>,
    lot: Lot,
    theme: Theme,
    tick_rate: Duration,
    last_tick: Instant,
    started_typing: bool,
    status: String,
    should_quit: bool,
}

impl<P: Persistence> TycoonApp<P> {
    pub fn new(
        session: GameSession<P>,
        report: StartReport,
        tick_rate: Duration,
        other_profiles: &[String],
    ) -> Self {
        let mut lot = Lot::new(LOT_ROWS, LOT_COLS);
        let snapshot = session.snapshot();
        for (index, item) in session.catalog().items().iter().enumerate() {
            for _ in 0..snapshot.owned(&item.id) {
                lot.place(index);
            }
        }

        let status = if report.resumed && report.offline_earnings > 0.0 {
            format!(
                "Welcome back! Your zoo earned {} coins while you were away.",
                display_amount(report.offline_earnings)
            )
        } else if report.resumed {
            "Welcome back!".to_string()
        } else if other_profiles.is_empty() {
            "Welcome to your new zoo.".to_string()
        } else {
            format!(
                "Welcome to your new zoo. Other saves: {} (set TYCOON_PROFILE to switch).",
                other_profiles.join(", ")
            )
        };

        Self {
            session,
            lot,
            theme: Theme::default(),
            tick_rate,
            last_tick: Instant::now(),
            started_typing: false,
            status,
            should_quit: false,
        }
    }

    pub fn into_session(self) -> GameSession<P> {
        self.session
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx, self.tick_rate);

        let result = loop {
            if let Err(err) = terminal.draw(|frame| self.draw(frame)) {
                break Err(anyhow::Error::from(err));
            }
            if self.should_quit {
                break Ok(());
            }
            match event_rx.recv().await {
                Some(event) => self.process_app_event(event),
                None => break Ok(()),
            }
        };

        restore_terminal(&mut terminal)?;
        info!("Terminal restored");
        result
    }

    fn process_app_event(&mut self, event: AppEvent) {
        self.accrue();
        match event {
            AppEvent::Input(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                self.handle_key(key)
            }
            AppEvent::Input(_) | AppEvent::Tick => {}
        }
    }

    fn accrue(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;
        self.session.tick(elapsed.as_secs_f64());
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            if let KeyCode::Char('c') = key.code {
                self.should_quit = true;
            }
            return;
        }

        let input = match key.code {
            KeyCode::Esc => {
                if self.session.matcher().state() == MatchState::Matching {
                    self.session.abandon_attempt();
                    self.status = "Attempt abandoned.".to_string();
                } else {
                    self.should_quit = true;
                }
                return;
            }
            KeyCode::Backspace => KeyInput::Backspace,
            KeyCode::Char(ch) => KeyInput::Char(ch),
            _ => return,
        };

        self.started_typing = true;
        let outcome = self.session.handle_key(input);
        debug!(?outcome, "key outcome");
        self.apply_outcome(outcome);
    }

    fn apply_outcome(&mut self, outcome: KeyOutcome) {
        match (&outcome.event, &outcome.construction) {
            (MatchEvent::WordCompleted(item), Some(Ok(receipt))) => {
                if let Some(index) = self.session.catalog().position(&item.id) {
                    self.lot.place_flashing(index, Instant::now());
                }
                self.status = format!(
                    "Built a {}! You now own {}.",
                    item.id.to_lowercase(),
                    receipt.owned
                );
            }
            (MatchEvent::WordCompleted(item), Some(Err(LedgerError::InsufficientFunds { .. }))) => {
                self.status = format!("Not enough coins for a {} anymore.", item.id);
            }
            (MatchEvent::WordCompleted(_), Some(Err(err))) => {
                self.status = format!("Construction failed: {err}");
            }
            (MatchEvent::KeyRejected(ch), _) => {
                self.status = format!("'{ch}' is not the next letter.");
            }
            (MatchEvent::KeyIgnored(KeyInput::Char(ch)), _) if ch.is_ascii_alphabetic() => {
                self.status = format!(
                    "Nothing affordable starts with '{}'.",
                    ch.to_ascii_uppercase()
                );
            }
            _ => {}
        }
    }

    fn draw(&self, frame: &mut Frame) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(4),
                Constraint::Length(1),
            ])
            .split(frame.size());

        self.draw_header(frame, layout[0]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(layout[1]);
        self.draw_lot(frame, body[0]);
        self.draw_catalog(frame, body[1]);

        self.draw_typing(frame, layout[2]);

        let status = Paragraph::new(self.status.as_str())
            .style(Style::default().fg(self.theme.muted));
        frame.render_widget(status, layout[3]);
    }

    fn draw_header(&self, frame: &mut Frame, area: Rect) {
        let snapshot = self.session.snapshot();
        let line = Line::from(vec![
            Span::styled(
                "Typing Tycoon",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("   Coins: "),
            Span::styled(
                snapshot.display_currency().to_string(),
                Style::default()
                    .fg(self.theme.success)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("   +{:.1}/s", self.session.income_rate()),
                Style::default().fg(self.theme.muted),
            ),
        ]);
        let header = Paragraph::new(line)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(header, area);
    }

    fn draw_lot(&self, frame: &mut Frame, area: Rect) {
        let now = Instant::now();
        let items = self.session.catalog().items();
        let lines: Vec<Line> = (0..self.lot.rows)
            .rev()
            .map(|row| {
                let spans: Vec<Span> = (0..self.lot.cols)
                    .map(|col| match self.lot.plots.get(&(row, col)) {
                        Some(&index) => {
                            let glyph = items
                                .get(index)
                                .and_then(|item| item.leading_char())
                                .unwrap_or('?');
                            let mut style = Style::default().fg(item_color(index));
                            if self.lot.is_flashing((row, col), now) {
                                style = style.add_modifier(Modifier::REVERSED | Modifier::BOLD);
                            }
                            Span::styled(format!("[{glyph}] "), style)
                        }
                        None => Span::styled(" .  ", Style::default().fg(self.theme.muted)),
                    })
                    .collect();
                Line::from(spans)
            })
            .collect();

        let lot = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Zoo"));
        frame.render_widget(lot, area);
    }

    fn draw_catalog(&self, frame: &mut Frame, area: Rect) {
        let snapshot = self.session.snapshot();
        let entries: Vec<ListItem> = self
            .session
            .catalog()
            .items()
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let affordable = self.session.is_affordable(item);
                let (word_color, style) = if affordable {
                    (item_color(index), Style::default().fg(self.theme.primary_fg))
                } else {
                    (self.theme.muted, Style::default().fg(self.theme.muted))
                };
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("{:<10}", item.word),
                        Style::default().fg(word_color).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!(
                            "{:>6} coins  +{}/s  owned {}",
                            display_amount(item.cost),
                            item.income_per_tick,
                            snapshot.owned(&item.id)
                        ),
                        style,
                    ),
                ]))
            })
            .collect();

        let list = List::new(entries).block(Block::default().borders(Borders::ALL).title("Buildings"));
        frame.render_widget(list, area);
    }

    fn draw_typing(&self, frame: &mut Frame, area: Rect) {
        let lines = if !self.started_typing {
            vec![Line::from(Span::styled(
                "Press any key to start building!",
                Style::default().fg(self.theme.accent),
            ))]
        } else {
            match self.session.hint() {
                Hint::Attempt {
                    target,
                    progress,
                    next,
                    mismatch,
                } => {
                    let mut spans = vec![
                        Span::raw("Type: "),
                        Span::styled(
                            progress.clone(),
                            Style::default()
                                .fg(self.theme.success)
                                .add_modifier(Modifier::BOLD),
                        ),
                    ];
                    if let Some(ch) = mismatch {
                        spans.push(Span::styled(
                            ch.to_string(),
                            Style::default()
                                .fg(self.theme.danger)
                                .add_modifier(Modifier::CROSSED_OUT),
                        ));
                    }
                    spans.push(Span::styled(
                        target[progress.len()..].to_string(),
                        Style::default().fg(self.theme.muted),
                    ));
                    let next_line = match next {
                        Some(ch) => Line::from(vec![
                            Span::raw("Next key: "),
                            Span::styled(
                                ch.to_string(),
                                Style::default()
                                    .fg(self.theme.accent)
                                    .add_modifier(Modifier::BOLD),
                            ),
                            Span::styled("   (Esc to cancel)", Style::default().fg(self.theme.muted)),
                        ]),
                        None => Line::default(),
                    };
                    vec![Line::from(spans), next_line]
                }
                Hint::Suggest(item) => vec![Line::from(format!(
                    "Type \"{}\" for a {} ({} coins)",
                    item.word,
                    item.id,
                    display_amount(item.cost)
                ))],
                Hint::SaveUp => vec![Line::from(Span::styled(
                    "Earn more coins to build!",
                    Style::default().fg(self.theme.muted),
                ))],
            }
        };

        let typing = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(typing, area);
    }
}

fn item_color(index: usize) -> Color {
    ITEM_COLORS[index % ITEM_COLORS.len()]
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>, tick_rate: Duration) {
    thread::spawn(move || loop {
        match event::poll(tick_rate) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use tycoon_core::{Catalog, MemoryStore, SessionOptions};

    fn app(currency: f64) -> TycoonApp<MemoryStore> {
        let options = SessionOptions {
            starting_currency: currency,
            ..SessionOptions::default()
        };
        let (session, report) = GameSession::start(
            Arc::new(Catalog::default_catalog()),
            options,
            MemoryStore::new(),
            Utc::now(),
        )
        .unwrap();
        TycoonApp::new(session, report, Duration::from_millis(100), &[])
    }

    fn press(app: &mut TycoonApp<MemoryStore>, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn lot_wraps_columns_then_rows() {
        let mut lot = Lot::new(2, 2);
        let plots: Vec<_> = (0..5).map(|index| lot.place(index)).collect();
        assert_eq!(plots, [(0, 0), (0, 1), (1, 0), (1, 1), (0, 0)]);
        assert_eq!(lot.plots.get(&(0, 0)), Some(&4));
    }

    #[test]
    fn typing_a_word_places_a_building() {
        let mut app = app(100.0);
        for ch in "cage".chars() {
            press(&mut app, KeyCode::Char(ch));
        }
        assert_eq!(app.lot.plots.get(&(0, 0)), Some(&0));
        assert_eq!(app.lot.next, (0, 1));
        assert!(app.status.starts_with("Built a cage"));
    }

    #[test]
    fn escape_cancels_before_quitting() {
        let mut app = app(100.0);
        press(&mut app, KeyCode::Char('C'));
        press(&mut app, KeyCode::Esc);
        assert!(!app.should_quit);
        assert_eq!(app.session.matcher().state(), MatchState::Idle);

        press(&mut app, KeyCode::Esc);
        assert!(app.should_quit);
    }

    #[test]
    fn wrong_letter_is_reported() {
        let mut app = app(100.0);
        press(&mut app, KeyCode::Char('C'));
        press(&mut app, KeyCode::Char('Z'));
        assert_eq!(app.status, "'Z' is not the next letter.");
    }

    #[test]
    fn fresh_start_mentions_other_saves() {
        let (session, report) = GameSession::start(
            Arc::new(Catalog::default_catalog()),
            SessionOptions::default(),
            MemoryStore::new(),
            Utc::now(),
        )
        .unwrap();
        let profiles = ["weekend".to_string(), "kids".to_string()];
        let greeted = TycoonApp::new(session, report, Duration::from_millis(100), &profiles);
        assert_eq!(
            greeted.status,
            "Welcome to your new zoo. Other saves: weekend, kids (set TYCOON_PROFILE to switch)."
        );
        assert_eq!(app(100.0).status, "Welcome to your new zoo.");
    }
}
