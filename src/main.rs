use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Row, Table};
use tracing::{info, warn};

use volley_review::bus::UiSignal;
use volley_review::config::AppConfig;
use volley_review::demo::{self, DEMO_TEAM_ID};
use volley_review::filter::SortConfig;
use volley_review::layout::RowMeasurements;
use volley_review::local_store::{self, SqliteStore};
use volley_review::logging;
use volley_review::media::{MediaElement, SimulatedMedia};
use volley_review::persist;
use volley_review::player::PlayerController;
use volley_review::postgrest::PostgrestStore;
use volley_review::stat_event::{Field, FieldKind, StatEvent, format_timestamp};
use volley_review::state::{self, ReviewState, Screen, apply_delta};
use volley_review::store::EventStore;
use volley_review::summary::{ActionStats, GameScope, format_average, format_percent};
use volley_review::sync::{self, SyncOptions};

/// Clip length used until a log with timestamps arrives.
const FALLBACK_DURATION: f64 = 3600.0;
/// Playback continues this long past the last logged touch.
const TAIL_SECS: f64 = 60.0;
const NOTES_WIDTH: usize = 24;
const MAX_ROW_HEIGHT: u16 = 3;
const UPCOMING_WIDTH: u16 = 30;

struct App {
    state: ReviewState,
    player: PlayerController<SimulatedMedia>,
    cmd_tx: mpsc::Sender<state::ProviderCommand>,
    signals: mpsc::Receiver<UiSignal>,
    rows: RowMeasurements,
    scroll: usize,
    grid_viewport: u16,
    last_log_version: u64,
    loaded_game: Option<String>,
    last_clock: Instant,
    should_quit: bool,
}

impl App {
    fn new(
        mut state: ReviewState,
        cfg: &AppConfig,
        cmd_tx: mpsc::Sender<state::ProviderCommand>,
    ) -> Self {
        let signals = state.bus.subscribe();
        Self {
            state,
            player: PlayerController::new(
                SimulatedMedia::new(FALLBACK_DURATION),
                cfg.playback.clone(),
            ),
            cmd_tx,
            signals,
            rows: RowMeasurements::new(1),
            scroll: 0,
            grid_viewport: 20,
            last_log_version: 0,
            loaded_game: None,
            last_clock: Instant::now(),
            should_quit: false,
        }
    }

    fn flush_commands(&mut self) {
        for cmd in self.state.take_commands() {
            if self.cmd_tx.send(cmd).is_err() {
                self.state.push_log("[WARN] Sync worker is gone; request dropped");
            }
        }
    }

    fn drain_signals(&mut self) {
        while let Ok(signal) = self.signals.try_recv() {
            self.rows.apply(&signal);
            if signal == UiSignal::RowsReplaced || signal == UiSignal::FiltersClosed {
                self.scroll = self.scroll.min(self.state.grid_selected);
            }
        }
    }

    /// Rebuild the timeline when the log changed and restore the playhead on a new game.
    fn sync_player(&mut self) {
        if self.state.log_version == self.last_log_version {
            return;
        }
        self.last_log_version = self.state.log_version;
        self.player.load_log(&self.state.log);
        let last_ts = self
            .state
            .log
            .iter()
            .filter_map(|r| r.timestamp)
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));
        let duration = last_ts.map_or(FALLBACK_DURATION, |t| t + TAIL_SECS);
        self.player.media_mut().set_duration(duration);

        if self.state.log_loading || self.loaded_game == self.state.game_id {
            return;
        }
        self.loaded_game = self.state.game_id.clone();
        match self.state.saved_position() {
            Some(t) => {
                if self.player.seek(t) {
                    info!(position = t, "restored playback position");
                }
            }
            None => {
                self.player.seek(0.0);
                self.player.skip_intro();
            }
        }
    }

    fn advance_clock(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_clock);
        self.last_clock = now;
        self.player.media_mut().advance(elapsed);
        self.player.on_time_update(now);
    }

    /// Measure rows around the selection; notes wrap onto extra lines.
    fn measure_rows(&mut self) {
        let rows = self.state.visible_rows();
        let end = (self.scroll + self.grid_viewport as usize + 1).min(rows.len());
        let start = self.scroll.min(end);
        for (offset, row) in rows[start..end].iter().enumerate() {
            let index = start + offset;
            if !self.rows.is_measured(index) {
                self.rows.record(index, row_height(row));
            }
        }
        self.scroll =
            self.rows
                .scroll_offset(self.state.grid_selected, self.scroll, self.grid_viewport);
    }

    fn current_time(&self) -> f64 {
        self.player.media().current_time()
    }

    fn on_key(&mut self, key: KeyEvent) {
        if self.state.editor.is_some() {
            self.on_editor_key(key);
            return;
        }
        if self.state.filter_editor.is_some() {
            self.on_filter_key(key);
            return;
        }
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.state.help_overlay = !self.state.help_overlay,
            KeyCode::F(1) => self.state.screen = Screen::Games,
            KeyCode::F(2) if self.state.game_id.is_some() => self.state.screen = Screen::Grid,
            KeyCode::F(3) => self.open_summary(),
            _ => match self.state.screen {
                Screen::Games => self.on_games_key(key),
                Screen::Grid => self.on_grid_key(key),
                Screen::Summary => self.on_summary_key(key),
            },
        }
    }

    fn on_games_key(&mut self, key: KeyEvent) {
        let len = self.state.games.len();
        match key.code {
            KeyCode::Char('j') | KeyCode::Down if len > 0 => {
                self.state.games_selected = (self.state.games_selected + 1).min(len - 1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.state.games_selected = self.state.games_selected.saturating_sub(1);
            }
            KeyCode::Enter => {
                let Some(id) = self.state.selected_game().map(|g| g.id.clone()) else {
                    return;
                };
                let t = self.current_time();
                self.state.remember_position(t);
                self.player.stop_highlights();
                self.state.open_game(&id);
            }
            KeyCode::Char('r') => self.state.request_games(),
            _ => {}
        }
    }

    fn on_grid_key(&mut self, key: KeyEvent) {
        let now = Instant::now();
        match key.code {
            KeyCode::Esc => self.state.screen = Screen::Games,
            KeyCode::Char('j') | KeyCode::Down => self.state.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.state.move_selection(-1),
            KeyCode::PageDown => self.state.move_selection(self.grid_viewport as isize),
            KeyCode::PageUp => self.state.move_selection(-(self.grid_viewport as isize)),
            KeyCode::Char('h') | KeyCode::Left => self.state.move_column(-1),
            KeyCode::Char('l') | KeyCode::Right => self.state.move_column(1),
            KeyCode::Enter | KeyCode::Char('e') => self.state.open_editor(),
            KeyCode::Char('g') => self.jump_to_selected(),
            KeyCode::Char('t') => {
                if let Some(row) = self.state.selected_row() {
                    let t = (self.current_time() * 100.0).round() / 100.0;
                    self.state.stamp_timestamp(&row.id, t);
                }
            }
            KeyCode::Char('f') => self.state.open_filter_editor(),
            KeyCode::Char('F') => self.state.clear_filters(),
            KeyCode::Char('z') => self.state.toggle_freeze(),
            KeyCode::Char('s') => {
                if let Some(field) = self.state.selected_field() {
                    self.state.toggle_sort(field);
                }
            }
            KeyCode::Char('c') => {
                if let Some(field) = self.state.selected_field() {
                    self.state.toggle_column(field);
                }
            }
            KeyCode::Char('C') => {
                for field in Field::GRID {
                    if !self.state.view.visible.contains(&field) {
                        self.state.toggle_column(field);
                    }
                }
            }
            KeyCode::Char('o') => {
                if let Some(row) = self.state.selected_row() {
                    self.state.insert_row_after(&row.id);
                }
            }
            KeyCode::Char('a') => self.state.add_block(),
            KeyCode::Char('D') => {
                if let Some(row) = self.state.selected_row() {
                    self.state.delete_row(&row.id);
                }
            }
            KeyCode::Char('r') => self.state.reload_log(),
            KeyCode::Char(' ') => {
                if let Err(err) = self.player.toggle_play() {
                    self.state.push_log(format!("[WARN] {err}"));
                }
            }
            KeyCode::Char(',') => self.player.rewind(),
            KeyCode::Char('.') => self.player.forward(),
            KeyCode::Char('<') => {
                if !self.player.step_frame(false) {
                    self.state.push_log("[INFO] Pause to step frames");
                }
            }
            KeyCode::Char('>') => {
                if !self.player.step_frame(true) {
                    self.state.push_log("[INFO] Pause to step frames");
                }
            }
            KeyCode::Char('[') => {
                self.player.previous_rally();
            }
            KeyCode::Char(']') => {
                self.player.next_rally();
            }
            KeyCode::Char('{') => {
                self.player.previous_set(now);
            }
            KeyCode::Char('}') => {
                if !self.player.next_set(now) {
                    self.state.push_log("[INFO] Already in the last set");
                }
            }
            KeyCode::Char(c @ '0'..='9') => {
                let tenths = c.to_digit(10).unwrap_or(0) as u8;
                self.player.seek_fraction(tenths);
            }
            KeyCode::Char('A') => {
                let on = self.player.toggle_autoplay();
                self.state
                    .push_log(format!("[INFO] Autoplay {}", if on { "on" } else { "off" }));
            }
            KeyCode::Char('I') => {
                if !self.player.skip_intro() {
                    self.state.push_log("[INFO] No intro to skip");
                }
            }
            KeyCode::Char('H') => {
                let rows = self.state.visible_rows();
                if !self.player.play_filtered(&rows) {
                    self.state.push_log("[INFO] No timestamped rows to play");
                }
            }
            KeyCode::Char('R') => {
                let rows = self.state.visible_rows();
                if !self.player.play_filtered_rallies(&rows) {
                    self.state.push_log("[INFO] No rallies to play");
                }
            }
            KeyCode::Char('x') => {
                if self.player.stop_highlights() {
                    self.state.push_log("[INFO] Highlights stopped");
                }
            }
            _ => {}
        }
    }

    fn jump_to_selected(&mut self) {
        let Some(row) = self.state.selected_row() else {
            return;
        };
        match self.state.row_jump_time(&row.id) {
            Some(t) => {
                if !self.player.jump_to_time(t) {
                    self.state.push_log("[WARN] Seek rejected by the player");
                }
            }
            None => self.state.push_log("[INFO] No timestamp at or above this row"),
        }
    }

    fn on_editor_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.state.cancel_editor(),
            KeyCode::Enter => self.state.commit_editor(),
            KeyCode::Tab => {
                if let Some(first) = self.state.editor_suggestions().into_iter().next()
                    && let Some(ed) = self.state.editor.as_mut()
                {
                    ed.buffer = first;
                }
            }
            KeyCode::Backspace => {
                if let Some(ed) = self.state.editor.as_mut() {
                    ed.buffer.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(ed) = self.state.editor.as_mut() {
                    ed.buffer.push(c);
                }
            }
            _ => {}
        }
    }

    fn on_filter_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.state.cancel_filter_editor(),
            KeyCode::Enter => self.state.commit_filter_editor(),
            KeyCode::Tab => {
                if let Some(ed) = self.state.filter_editor.as_mut() {
                    ed.cycle_operator();
                }
            }
            KeyCode::Up | KeyCode::Down => {
                if let Some(ed) = self.state.filter_editor.as_mut() {
                    ed.toggle_logic();
                }
            }
            KeyCode::Backspace => {
                if let Some(ed) = self.state.filter_editor.as_mut() {
                    ed.input.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(ed) = self.state.filter_editor.as_mut() {
                    ed.input.push(c);
                }
            }
            _ => {}
        }
    }

    fn open_summary(&mut self) {
        self.state.screen = Screen::Summary;
        if self.state.summary.data.is_none() && !self.state.summary.loading {
            self.state.request_summary();
        }
    }

    fn on_summary_key(&mut self, key: KeyEvent) {
        let players = self
            .state
            .summary
            .data
            .as_ref()
            .map_or(0, |s| s.players.len());
        match key.code {
            KeyCode::Esc => {
                self.state.screen = if self.state.game_id.is_some() {
                    Screen::Grid
                } else {
                    Screen::Games
                };
            }
            KeyCode::Char('j') | KeyCode::Down if players > 0 => {
                self.state.summary.selected = (self.state.summary.selected + 1).min(players - 1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.state.summary.selected = self.state.summary.selected.saturating_sub(1);
            }
            KeyCode::Char('g') => self.state.cycle_summary_games(),
            KeyCode::Char('n') => self.state.cycle_summary_set(),
            KeyCode::Char('p') => self.state.cycle_summary_setter(),
            KeyCode::Char('r') => self.state.request_summary(),
            KeyCode::Char('x') => {
                let path = export_path();
                self.state.request_export(path.display().to_string());
            }
            _ => {}
        }
    }
}

fn row_height(row: &StatEvent) -> u16 {
    let len = row.notes.as_deref().map_or(0, |n| n.chars().count());
    let lines = len.div_ceil(NOTES_WIDTH).max(1);
    (lines as u16).min(MAX_ROW_HEIGHT)
}

fn export_path() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("volley_summary_{stamp}.xlsx"))
}

/// Practice mode runs against a seeded local database; otherwise the team's PostgREST API.
fn open_store(cfg: &AppConfig, state: &mut ReviewState) -> Result<Arc<dyn EventStore>> {
    let practice = std::env::args().any(|a| a == "--practice") || cfg.team_id.is_none();
    if !practice {
        let store = PostgrestStore::from_config(cfg)?;
        info!(url = store.base_url(), "using PostgREST store");
        state.source = "postgrest";
        state.team_id = cfg.team_id.clone();
        return Ok(Arc::new(store));
    }

    let path = cfg
        .db_path
        .clone()
        .or_else(local_store::default_db_path)
        .context("no cache directory for the practice database")?;
    let store = SqliteStore::open(&path)?;
    let game = demo::generate(1, 3);
    if store.game(game.game_id())?.is_none() {
        let rows = game.seed_into(&store)?;
        info!(rows, path = %path.display(), "seeded practice game");
    }
    state.source = "practice";
    state.team_id = Some(DEMO_TEAM_ID.to_string());
    state.roster = demo::demo_roster();
    Ok(Arc::new(store))
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let cfg = AppConfig::from_env();
    let log_path = cfg.log_path.clone().or_else(logging::default_log_path);
    logging::init_logging(log_path.as_deref());

    let mut review = ReviewState::new();
    let store = open_store(&cfg, &mut review)?;
    persist::load_into_state(&mut review);

    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let worker = sync::spawn_sync(
        store,
        SyncOptions {
            patch_batch: cfg.patch_batch,
        },
        tx,
        cmd_rx,
    );

    let mut app = App::new(review, &cfg, cmd_tx);
    app.state.request_games();
    if let Some(game_id) = cfg.game_id.clone().or_else(|| app.state.resume_game.clone()) {
        app.state.open_game(&game_id);
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, rx);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    let t = app.current_time();
    app.state.remember_position(t);
    persist::save_from_state(&app.state);
    if app.state.has_pending_writes() {
        warn!("exiting with edits still waiting to be saved");
    }
    drop(app);
    let _ = worker.join();

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<state::Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(delta) = rx.try_recv() {
            apply_delta(&mut app.state, delta);
        }
        app.flush_commands();
        app.drain_signals();
        app.sync_player();
        app.advance_clock();
        app.state.maybe_clear_export(Instant::now());

        let size = terminal.size()?;
        // Header, footer, borders and the column header row.
        app.grid_viewport = size.height.saturating_sub(9).max(1);
        app.measure_rows();

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key);
            app.flush_commands();
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(app))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    match app.state.screen {
        Screen::Games => render_games(frame, chunks[1], &app.state),
        Screen::Grid => render_grid(frame, chunks[1], app),
        Screen::Summary => render_summary(frame, chunks[1], &app.state),
    }

    let footer = Paragraph::new(footer_text(&app.state))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[2]);

    if app.state.editor.is_some() {
        render_cell_editor(frame, frame.size(), &app.state);
    }
    if app.state.filter_editor.is_some() {
        render_filter_editor(frame, frame.size(), &app.state);
    }
    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(app: &App) -> String {
    let state = &app.state;
    let game = state
        .current_game()
        .map(|g| match &g.date {
            Some(date) => format!("{} {date}", g.title),
            None => g.title.clone(),
        })
        .or_else(|| state.game_id.clone())
        .unwrap_or_else(|| "no game".to_string());
    let line1 = format!(
        "VOLLEY REVIEW | {} | {}{}",
        state.source,
        game,
        if state.log_loading { " (loading)" } else { "" }
    );

    let status = app.player.status();
    let media = app.player.media();
    let play = if media.is_paused() { "||" } else { ">" };
    let rally = status
        .rally_number
        .map_or_else(|| "-".to_string(), |n| n.to_string());
    let mut line2 = format!(
        "Set {} | Rally {} | {} | {} {} / {}",
        status.current_set,
        rally,
        status.score_label(),
        play,
        format_timestamp(media.current_time()),
        format_timestamp(media.duration()),
    );
    if app.player.autoplay() {
        line2.push_str(" | AUTO");
    }
    if let Some((idx, total, window)) = app.player.sequence_progress() {
        line2.push_str(&format!(
            " | HL {}/{} [{}-{}]",
            idx + 1,
            total,
            format_timestamp(window.start),
            format_timestamp(window.end)
        ));
    }
    format!("{line1}\n{line2}")
}

fn footer_text(state: &ReviewState) -> String {
    let keys = match state.screen {
        Screen::Games => "F1 Games | F2 Grid | F3 Summary | j/k Move | Enter Open | r Reload | ? Help | q Quit",
        Screen::Grid => "e Edit | f Filter | s Sort | space Play | [/] Rally | {/} Set | H Highlights | ? Help | q Quit",
        Screen::Summary => "g Games | n Set | p Setter | x Export | r Refresh | Esc Back | ? Help | q Quit",
    };
    let status = if state.export.active {
        let mark = if state.export.failed { "failed" } else { "export" };
        format!(
            "[{mark} {}/{}] {}",
            state.export.current, state.export.total, state.export.message
        )
    } else {
        state.logs.back().cloned().unwrap_or_default()
    };
    format!("{keys}\n{status}")
}

fn render_games(frame: &mut Frame, area: Rect, state: &ReviewState) {
    if state.games.is_empty() {
        let text = if state.games_loading {
            "Loading games..."
        } else {
            "No games for this team. Press r to reload."
        };
        frame.render_widget(Paragraph::new(text), area);
        return;
    }
    let (start, end) = visible_range(
        state.games_selected,
        state.games.len(),
        area.height.saturating_sub(1) as usize,
    );
    let rows: Vec<Row> = state.games[start..end]
        .iter()
        .enumerate()
        .map(|(offset, game)| {
            let style = if start + offset == state.games_selected {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            let opened = if state.game_id.as_deref() == Some(game.id.as_str()) {
                "*"
            } else {
                ""
            };
            Row::new(vec![
                opened.to_string(),
                game.date.clone().unwrap_or_default(),
                game.title.clone(),
                if game.is_scored { "scored" } else { "" }.to_string(),
            ])
            .style(style)
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(1),
            Constraint::Length(12),
            Constraint::Min(20),
            Constraint::Length(8),
        ],
    )
    .header(
        Row::new(vec!["", "Date", "Game", ""])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    );
    frame.render_widget(table, area);
}

fn column_width(field: Field) -> u16 {
    match field {
        Field::Notes => NOTES_WIDTH as u16,
        Field::Player | Field::SetToPlayer | Field::ActionType => 12,
        Field::PlayerUserId | Field::SetToUserId => 10,
        Field::SetToPosition | Field::Result => 8,
        _ => match field.kind() {
            FieldKind::Text => 10,
            _ => 6,
        },
    }
}

fn render_grid(frame: &mut Frame, area: Rect, app: &App) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(UPCOMING_WIDTH)])
        .split(area);

    let state = &app.state;
    let columns = state.visible_columns();
    let rows = state.visible_rows();
    let mut title = format!("Stats ({} rows", rows.len());
    if state.view.is_filtered() {
        title.push_str(&format!(" of {}", state.log.len()));
    }
    title.push(')');
    if state.view.is_frozen() {
        title.push_str(" [frozen]");
    }
    let sort = state.view.sort;
    if sort != SortConfig::default() {
        title.push_str(&format!(" sort: {} {:?}", sort.field.label(), sort.direction));
    }
    let block = Block::default().title(title).borders(Borders::ALL);

    if rows.is_empty() {
        let text = if state.log_loading {
            "Loading stats..."
        } else if state.view.is_filtered() {
            "No rows match the filters. F clears them."
        } else {
            "No rows yet. a adds a block of ten."
        };
        frame.render_widget(Paragraph::new(text).block(block), cols[0]);
    } else {
        let selected_field = state.selected_field();
        let header = Row::new(columns.iter().map(|f| {
            let mut label = f.label().to_string();
            if state.view.filters.contains_key(f) {
                label.push('*');
            }
            let style = if Some(*f) == selected_field {
                Style::default()
                    .add_modifier(Modifier::BOLD)
                    .fg(Color::Yellow)
            } else {
                Style::default().add_modifier(Modifier::BOLD)
            };
            Line::styled(label, style)
        }));
        let mut used = 0u16;
        let mut body = Vec::new();
        for (index, row) in rows.iter().enumerate().skip(app.scroll) {
            let height = app.rows.height(index);
            if used + height > app.grid_viewport {
                break;
            }
            used += height;
            let selected = index == state.grid_selected;
            let cells = columns.iter().map(|f| {
                let text = cell_text(row, *f, height);
                let style = if selected && Some(*f) == selected_field {
                    Style::default().bg(Color::Blue)
                } else {
                    Style::default()
                };
                Text::styled(text, style)
            });
            let style = if selected {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            body.push(Row::new(cells).height(height).style(style));
        }
        let widths: Vec<Constraint> = columns
            .iter()
            .map(|f| Constraint::Length(column_width(*f)))
            .collect();
        let table = Table::new(body, widths).header(header).block(block);
        frame.render_widget(table, cols[0]);
    }

    render_upcoming(frame, cols[1], app);
}

fn cell_text(row: &StatEvent, field: Field, height: u16) -> String {
    match field {
        Field::Timestamp => row.timestamp.map(format_timestamp).unwrap_or_default(),
        Field::Notes => {
            let chars: Vec<char> = row.notes.as_deref().unwrap_or_default().chars().collect();
            chars
                .chunks(NOTES_WIDTH)
                .take(height as usize)
                .map(|c| c.iter().collect::<String>())
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => row.value(field).display(),
    }
}

fn render_upcoming(frame: &mut Frame, area: Rect, app: &App) {
    let status = app.player.status();
    let mut lines = vec![Line::styled(
        format!("Set {}  {}", status.current_set, status.score_label()),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    lines.push(Line::raw(""));
    if status.upcoming.is_empty() {
        lines.push(Line::raw("No upcoming touches"));
    }
    for ev in &status.upcoming {
        lines.push(Line::raw(format!(
            "{:>7} {} {}",
            ev.timestamp.map(format_timestamp).unwrap_or_default(),
            ev.player.as_deref().unwrap_or("-"),
            ev.action_type.as_deref().unwrap_or("")
        )));
    }
    let panel = Paragraph::new(lines).block(Block::default().title("Up next").borders(Borders::ALL));
    frame.render_widget(panel, area);
}

fn stats_cells(label: &str, stats: &ActionStats) -> Row<'static> {
    Row::new(vec![
        label.to_string(),
        stats.qty.to_string(),
        format_average(stats.average()),
        format_percent(stats.success_pct()),
        format_percent(stats.fail_pct()),
    ])
}

fn stats_widths() -> [Constraint; 5] {
    [
        Constraint::Min(12),
        Constraint::Length(5),
        Constraint::Length(6),
        Constraint::Length(10),
        Constraint::Length(8),
    ]
}

fn scope_label(state: &ReviewState) -> String {
    let games = match &state.summary.scope.games {
        GameScope::Scored => "scored games".to_string(),
        GameScope::All => "all games".to_string(),
        GameScope::Single(id) => state
            .games
            .iter()
            .find(|g| &g.id == id)
            .map_or_else(|| id.clone(), |g| g.title.clone()),
    };
    let set = state
        .summary
        .scope
        .set
        .map_or_else(|| "all sets".to_string(), |s| format!("set {s}"));
    let setter = state.summary.setter.as_deref().unwrap_or("all setters");
    format!("{games} | {set} | {setter}")
}

fn render_summary(frame: &mut Frame, area: Rect, state: &ReviewState) {
    let title = format!("Summary: {}", scope_label(state));
    let Some(summary) = &state.summary.data else {
        let text = if state.summary.loading {
            "Loading summary..."
        } else {
            "No summary loaded. Press r."
        };
        frame.render_widget(
            Paragraph::new(text).block(Block::default().title(title).borders(Borders::ALL)),
            area,
        );
        return;
    };

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);
    let header = Row::new(vec!["Player", "Qty", "Avg", "Success %", "Fail %"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let (start, end) = visible_range(
        state.summary.selected,
        summary.players.len(),
        cols[0].height.saturating_sub(4) as usize,
    );
    let mut rows: Vec<Row> = summary.players[start..end]
        .iter()
        .enumerate()
        .map(|(offset, player)| {
            let row = stats_cells(player, &summary.player_total(player));
            if start + offset == state.summary.selected {
                row.style(Style::default().bg(Color::DarkGray))
            } else {
                row
            }
        })
        .collect();
    rows.push(stats_cells("Total", &summary.grand_total).style(Style::default().add_modifier(Modifier::BOLD)));
    let loading = if state.summary.loading { " (refreshing)" } else { "" };
    let table = Table::new(rows, stats_widths())
        .header(header)
        .block(Block::default().title(format!("{title}{loading}")).borders(Borders::ALL));
    frame.render_widget(table, cols[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(cols[1]);

    let selected = summary.players.get(state.summary.selected);
    let action_rows: Vec<Row> = match selected {
        Some(player) => summary
            .actions
            .iter()
            .filter_map(|a| summary.stats(player, a).map(|s| stats_cells(a, s)))
            .collect(),
        None => summary
            .actions
            .iter()
            .filter_map(|a| summary.action_totals.get(a).map(|s| stats_cells(a, s)))
            .collect(),
    };
    let action_title = selected.map_or_else(|| "Actions".to_string(), |p| format!("{p} by action"));
    let action_table = Table::new(action_rows, stats_widths())
        .header(
            Row::new(vec!["Action", "Qty", "Avg", "Success %", "Fail %"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().title(action_title).borders(Borders::ALL));
    frame.render_widget(action_table, right[0]);

    let mut lines = vec![Line::styled(
        format!("Assists: {}", summary.total_assists()),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    for (setter, count) in &summary.assists {
        lines.push(Line::raw(format!("  {setter:<12} {count}")));
    }
    lines.push(Line::raw(""));
    lines.push(Line::styled(
        format!("Sets delivered: {}", summary.setting.total),
        Style::default().add_modifier(Modifier::BOLD),
    ));
    for row in &summary.setting.by_position {
        lines.push(Line::raw(format!(
            "  {:<12} {:>4} {:>7}",
            row.key,
            row.count,
            row.percent_label()
        )));
    }
    for row in &summary.setting.by_player {
        lines.push(Line::raw(format!(
            "  to {:<9} {:>4} {:>7}",
            row.key,
            row.count,
            row.percent_label()
        )));
    }
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().title("Setting").borders(Borders::ALL)),
        right[1],
    );
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn render_cell_editor(frame: &mut Frame, area: Rect, state: &ReviewState) {
    let Some(ed) = &state.editor else {
        return;
    };
    let popup = centered_rect(50, 40, area);
    frame.render_widget(Clear, popup);
    let mut lines = vec![
        Line::raw(format!("{}: {}_", ed.field.label(), ed.buffer)),
        Line::raw(""),
    ];
    let suggestions = state.editor_suggestions();
    if !suggestions.is_empty() {
        lines.push(Line::styled(
            "Tab accepts:",
            Style::default().fg(Color::DarkGray),
        ));
        for s in suggestions.iter().take(6) {
            lines.push(Line::raw(format!("  {s}")));
        }
    }
    let editor = Paragraph::new(lines).block(
        Block::default()
            .title("Edit cell (Enter saves, Esc cancels)")
            .borders(Borders::ALL),
    );
    frame.render_widget(editor, popup);
}

fn render_filter_editor(frame: &mut Frame, area: Rect, state: &ReviewState) {
    let Some(ed) = &state.filter_editor else {
        return;
    };
    let popup = centered_rect(50, 40, area);
    frame.render_widget(Clear, popup);
    let existing = state
        .view
        .filters
        .get(&ed.field)
        .map_or(0, |f| f.conditions.len());
    let mut lines = vec![
        Line::raw(format!("Column: {}", ed.field.label())),
        Line::raw(format!("Operator: {} (Tab)", ed.operator().label())),
        Line::raw(format!("Value: {}_", ed.input)),
    ];
    if existing > 0 {
        lines.push(Line::raw(format!(
            "Joins {existing} existing condition(s) with {:?} (Up/Down)",
            ed.logic
        )));
    }
    let popup_text = Paragraph::new(lines).block(
        Block::default()
            .title("Filter (Enter applies, Esc cancels)")
            .borders(Borders::ALL),
    );
    frame.render_widget(popup_text, popup);
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(70, 80, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "Volley Review - Help",
        "",
        "Global:",
        "  F1 / F2 / F3  Games / Grid / Summary",
        "  ?             Toggle help",
        "  q             Quit",
        "",
        "Grid:",
        "  j/k h/l       Move row / column",
        "  e / Enter     Edit cell (Tab takes a suggestion)",
        "  t             Stamp current video time",
        "  g             Jump video to row",
        "  f / F         Add filter / clear filters",
        "  z             Freeze or unfreeze filtered rows",
        "  s             Sort by column",
        "  c / C         Hide column / show all",
        "  o / a / D     Insert below / add ten rows / delete row",
        "",
        "Playback:",
        "  space         Play or pause",
        "  , .           Back 3s / forward 10s",
        "  < >           Frame step while paused",
        "  [ ] { }       Previous/next rally, previous/next set",
        "  0-9           Seek to tenths of the video",
        "  A / I         Autoplay / skip intro",
        "  H / R / x     Play filtered touches / rallies / stop",
        "",
        "Summary:",
        "  g n p         Cycle games, set, setter",
        "  x             Export to xlsx",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
