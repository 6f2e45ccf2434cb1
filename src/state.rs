use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tracing::{debug, info};

use crate::bus::{SignalBus, UiSignal};
use crate::derive::{AppliedEdit, EditOutcome, RowPatch, apply_edit};
use crate::edit::{self, EditError};
use crate::export::ExportReport;
use crate::filter::{ColumnFilter, Condition, Logic, Operator, ViewState};
use crate::stat_event::{Field, Game, NewStatEvent, Roster, StatEvent, known_names, suggestions};
use crate::summary::{GameScope, Summary, SummaryScope};

const MAX_LOGS: usize = 200;
pub const BLOCK_ROWS: usize = 10;
pub const INSERT_SEQ_STEP: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Games,
    Grid,
    Summary,
}

/// Text being typed into one grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEditor {
    pub row_id: String,
    pub field: Field,
    pub buffer: String,
}

/// A condition being built for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEditor {
    pub field: Field,
    pub operator_idx: usize,
    pub input: String,
    pub logic: Logic,
}

impl FilterEditor {
    pub fn operators(&self) -> &'static [Operator] {
        Operator::for_kind(self.field.kind())
    }

    pub fn operator(&self) -> Operator {
        let ops = self.operators();
        ops[self.operator_idx % ops.len()]
    }

    pub fn cycle_operator(&mut self) {
        self.operator_idx = (self.operator_idx + 1) % self.operators().len();
    }

    pub fn toggle_logic(&mut self) {
        self.logic = match self.logic {
            Logic::And => Logic::Or,
            Logic::Or => Logic::And,
        };
    }

    /// `between` takes `min..max`; either side may be blank.
    pub fn condition(&self) -> Condition {
        let op = self.operator();
        let mut cond = if op == Operator::Between {
            let (min, max) = self
                .input
                .split_once("..")
                .unwrap_or((self.input.as_str(), ""));
            Condition::between(min.trim(), max.trim())
        } else {
            Condition::new(op, self.input.trim())
        };
        cond.logic = Some(self.logic);
        cond
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PendingEdit {
    row_id: String,
    field: Field,
    raw: String,
}

#[derive(Debug, Clone, Default)]
pub struct SummaryView {
    pub scope: SummaryScope,
    pub setter: Option<String>,
    pub data: Option<Summary>,
    pub loading: bool,
    pub selected: usize,
}

#[derive(Debug, Clone)]
pub struct ExportState {
    pub active: bool,
    pub done: bool,
    pub path: Option<String>,
    pub current: usize,
    pub total: usize,
    pub message: String,
    pub failed: bool,
    pub last_updated: Option<Instant>,
}

impl Default for ExportState {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportState {
    pub fn new() -> Self {
        Self {
            active: false,
            done: false,
            path: None,
            current: 0,
            total: 0,
            message: String::new(),
            failed: false,
            last_updated: None,
        }
    }

    pub fn clear_if_done_for(&mut self, now: Instant, keep_secs: u64) {
        if !self.active || !self.done {
            return;
        }
        let Some(last) = self.last_updated else {
            return;
        };
        if now.duration_since(last).as_secs() >= keep_secs {
            *self = Self::new();
        }
    }
}

#[derive(Debug)]
pub struct ReviewState {
    pub screen: Screen,
    pub help_overlay: bool,
    pub source: &'static str,
    pub team_id: Option<String>,
    pub games: Vec<Game>,
    pub games_selected: usize,
    pub games_loading: bool,
    pub game_id: Option<String>,
    /// Game to reopen on start, from the persisted cache.
    pub resume_game: Option<String>,
    pub log: Vec<StatEvent>,
    pub log_loading: bool,
    /// Bumped whenever `log` changes; consumers rebuild derived timelines on change.
    pub log_version: u64,
    pub roster: Roster,
    pub view: ViewState,
    pub grid_selected: usize,
    pub grid_column: usize,
    pub editor: Option<CellEditor>,
    pub filter_editor: Option<FilterEditor>,
    pending_edits: VecDeque<PendingEdit>,
    in_flight: Option<u64>,
    next_seq: u64,
    outbox: Vec<ProviderCommand>,
    pub summary: SummaryView,
    pub saved_positions: HashMap<String, f64>,
    pub saved_views: HashMap<String, ViewState>,
    pub logs: VecDeque<String>,
    pub export: ExportState,
    pub bus: SignalBus,
}

impl Default for ReviewState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewState {
    pub fn new() -> Self {
        Self {
            screen: Screen::Games,
            help_overlay: false,
            source: "postgrest",
            team_id: None,
            games: Vec::new(),
            games_selected: 0,
            games_loading: false,
            game_id: None,
            resume_game: None,
            log: Vec::new(),
            log_loading: false,
            log_version: 0,
            roster: Roster::default(),
            view: ViewState::default(),
            grid_selected: 0,
            grid_column: 0,
            editor: None,
            filter_editor: None,
            pending_edits: VecDeque::new(),
            in_flight: None,
            next_seq: 1,
            outbox: Vec::new(),
            summary: SummaryView::default(),
            saved_positions: HashMap::new(),
            saved_views: HashMap::new(),
            logs: VecDeque::with_capacity(MAX_LOGS),
            export: ExportState::new(),
            bus: SignalBus::new(),
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn maybe_clear_export(&mut self, now: Instant) {
        self.export.clear_if_done_for(now, 8);
    }

    /// Commands queued for the worker since the last call.
    pub fn take_commands(&mut self) -> Vec<ProviderCommand> {
        std::mem::take(&mut self.outbox)
    }

    pub fn has_pending_writes(&self) -> bool {
        self.in_flight.is_some() || !self.pending_edits.is_empty()
    }

    // Games

    pub fn request_games(&mut self) {
        let Some(team_id) = self.team_id.clone() else {
            self.push_log("[WARN] No team selected");
            return;
        };
        self.games_loading = true;
        self.outbox.push(ProviderCommand::LoadGames { team_id });
    }

    pub fn selected_game(&self) -> Option<&Game> {
        self.games.get(self.games_selected)
    }

    pub fn current_game(&self) -> Option<&Game> {
        let id = self.game_id.as_deref()?;
        self.games.iter().find(|g| g.id == id)
    }

    pub fn open_game(&mut self, game_id: &str) {
        if let Some(prev) = self.game_id.take() {
            self.saved_views.insert(prev, self.view.clone());
        }
        self.game_id = Some(game_id.to_string());
        self.view = self.saved_views.get(game_id).cloned().unwrap_or_default();
        self.view.unfreeze();
        self.log.clear();
        self.log_version += 1;
        self.log_loading = true;
        self.grid_selected = 0;
        self.editor = None;
        self.filter_editor = None;
        self.pending_edits.clear();
        self.screen = Screen::Grid;
        self.bus.publish(UiSignal::RowsReplaced);
        self.outbox.push(ProviderCommand::LoadEvents {
            game_id: game_id.to_string(),
        });
    }

    pub fn reload_log(&mut self) {
        if let Some(game_id) = self.game_id.clone() {
            self.log_loading = true;
            self.outbox.push(ProviderCommand::LoadEvents { game_id });
        }
    }

    pub fn remember_position(&mut self, t: f64) {
        if let Some(game_id) = self.game_id.clone()
            && t.is_finite()
            && t > 0.0
        {
            self.saved_positions.insert(game_id, t);
        }
    }

    pub fn saved_position(&self) -> Option<f64> {
        self.saved_positions.get(self.game_id.as_deref()?).copied()
    }

    // Grid

    pub fn visible_rows(&self) -> Vec<StatEvent> {
        self.view.rows(&self.log)
    }

    pub fn visible_columns(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| self.view.visible.contains(f))
            .collect()
    }

    pub fn selected_row(&self) -> Option<StatEvent> {
        self.visible_rows().into_iter().nth(self.grid_selected)
    }

    pub fn selected_field(&self) -> Option<Field> {
        self.visible_columns().get(self.grid_column).copied()
    }

    pub fn move_selection(&mut self, delta: isize) {
        let len = self.visible_rows().len();
        if len == 0 {
            self.grid_selected = 0;
            return;
        }
        let next = self.grid_selected as isize + delta;
        self.grid_selected = next.clamp(0, len as isize - 1) as usize;
    }

    pub fn move_column(&mut self, delta: isize) {
        let len = self.visible_columns().len();
        if len == 0 {
            return;
        }
        let next = self.grid_column as isize + delta;
        self.grid_column = next.clamp(0, len as isize - 1) as usize;
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_rows().len();
        self.grid_selected = self.grid_selected.min(len.saturating_sub(1));
        let cols = self.visible_columns().len();
        self.grid_column = self.grid_column.min(cols.saturating_sub(1));
    }

    /// Where a row click should seek: its own timestamp, else the last one logged before it.
    pub fn row_jump_time(&self, row_id: &str) -> Option<f64> {
        let idx = self.log.iter().position(|r| r.id == row_id)?;
        self.log[idx]
            .timestamp
            .or_else(|| self.log[..idx].iter().rev().find_map(|r| r.timestamp))
    }

    pub fn known_names(&self) -> Vec<String> {
        known_names(&self.roster, &self.log)
    }

    // Cell editing

    pub fn open_editor(&mut self) {
        let (Some(row), Some(field)) = (self.selected_row(), self.selected_field()) else {
            return;
        };
        if !field.is_editable() {
            self.push_log(format!("[INFO] {} is derived and read-only", field.label()));
            return;
        }
        // Keep the row in view while its filtered value changes.
        if self.view.is_filtered() && !self.view.is_frozen() {
            self.view.freeze(&self.log);
        }
        self.editor = Some(CellEditor {
            row_id: row.id.clone(),
            field,
            buffer: row.value(field).display(),
        });
    }

    pub fn editor_suggestions(&self) -> Vec<String> {
        match &self.editor {
            Some(ed) => suggestions(ed.field, &ed.buffer, &self.known_names()),
            None => Vec::new(),
        }
    }

    pub fn cancel_editor(&mut self) {
        self.editor = None;
    }

    pub fn commit_editor(&mut self) {
        if let Some(ed) = self.editor.take() {
            self.submit_edit(&ed.row_id, ed.field, &ed.buffer);
        }
    }

    /// Edits run one at a time; later ones wait until the previous write settles.
    pub fn submit_edit(&mut self, row_id: &str, field: Field, raw: &str) {
        let pending = PendingEdit {
            row_id: row_id.to_string(),
            field,
            raw: raw.to_string(),
        };
        if self.in_flight.is_some() {
            self.pending_edits.push_back(pending);
            return;
        }
        self.start_edit(pending);
    }

    pub fn stamp_timestamp(&mut self, row_id: &str, t: f64) {
        self.submit_edit(row_id, Field::Timestamp, &format!("{}", t.max(0.0)));
    }

    fn start_edit(&mut self, pending: PendingEdit) {
        match apply_edit(
            &self.log,
            &pending.row_id,
            pending.field,
            &pending.raw,
            &self.roster,
        ) {
            Ok(EditOutcome::Unchanged) => {}
            Ok(EditOutcome::Applied(mut applied)) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.log = std::mem::take(&mut applied.log);
                self.log_version += 1;
                let row_index = self
                    .visible_rows()
                    .iter()
                    .position(|r| r.id == pending.row_id)
                    .unwrap_or(0);
                self.bus.publish(UiSignal::RowResized(row_index));
                info!(
                    row = %pending.row_id,
                    field = %pending.field,
                    cascade = applied.cascade.len(),
                    "edit applied"
                );
                self.in_flight = Some(seq);
                self.outbox.push(ProviderCommand::PersistEdit {
                    seq,
                    edit: applied,
                });
            }
            Err(EditError::RowNotFound(id)) => {
                debug!(row = %id, "edit dropped; row no longer in log");
            }
            Err(err) => self.push_log(format!("[WARN] {err}")),
        }
    }

    fn drain_pending(&mut self) {
        while self.in_flight.is_none() {
            let Some(next) = self.pending_edits.pop_front() else {
                break;
            };
            self.start_edit(next);
        }
    }

    // Rows

    pub fn insert_row_after(&mut self, row_id: &str) {
        let Some(row) = self.log.iter().find(|r| r.id == row_id) else {
            return;
        };
        let rows = vec![row_after(row)];
        self.outbox.push(ProviderCommand::InsertRows {
            game_id: row.game_id.clone(),
            after: Some(row_id.to_string()),
            rows,
        });
    }

    pub fn add_block(&mut self) {
        let Some(game_id) = self.game_id.clone() else {
            return;
        };
        let team_id = self
            .current_game()
            .map(|g| g.team_id.clone())
            .or_else(|| self.team_id.clone())
            .unwrap_or_default();
        let rows = bottom_block(&self.log, &game_id, &team_id);
        self.outbox.push(ProviderCommand::InsertRows {
            game_id,
            after: None,
            rows,
        });
    }

    pub fn delete_row(&mut self, row_id: &str) {
        if self.log.iter().any(|r| r.id == row_id) {
            self.outbox.push(ProviderCommand::DeleteRow {
                id: row_id.to_string(),
            });
        }
    }

    // View

    pub fn toggle_sort(&mut self, field: Field) {
        self.view.toggle_sort(field);
        self.bus.publish(UiSignal::RowsReplaced);
    }

    pub fn toggle_column(&mut self, field: Field) {
        self.view.toggle_column(field);
        self.clamp_selection();
        self.bus.publish(UiSignal::LayoutChanged);
    }

    pub fn toggle_freeze(&mut self) {
        if self.view.is_frozen() {
            self.view.unfreeze();
        } else {
            self.view.freeze(&self.log);
        }
        self.clamp_selection();
        self.bus.publish(UiSignal::RowsReplaced);
    }

    pub fn open_filter_editor(&mut self) {
        if let Some(field) = self.selected_field() {
            self.filter_editor = Some(FilterEditor {
                field,
                operator_idx: 0,
                input: String::new(),
                logic: Logic::And,
            });
        }
    }

    /// Append the editor's condition to its column filter.
    pub fn commit_filter_editor(&mut self) {
        let Some(ed) = self.filter_editor.take() else {
            return;
        };
        let mut filter = self
            .view
            .filters
            .get(&ed.field)
            .cloned()
            .unwrap_or_else(|| ColumnFilter::new(Vec::new()));
        filter.conditions.push(ed.condition());
        self.view.set_filter(ed.field, filter);
        self.close_filters();
    }

    pub fn cancel_filter_editor(&mut self) {
        self.filter_editor = None;
        self.close_filters();
    }

    pub fn clear_filters(&mut self) {
        self.view.clear_filters();
        self.view.unfreeze();
        self.close_filters();
    }

    fn close_filters(&mut self) {
        self.clamp_selection();
        self.bus.publish(UiSignal::FiltersClosed);
    }

    // Summary

    pub fn request_summary(&mut self) {
        let Some(team_id) = self.team_id.clone() else {
            self.push_log("[WARN] No team selected");
            return;
        };
        self.summary.loading = true;
        self.outbox.push(ProviderCommand::LoadSummary {
            team_id,
            scope: self.summary.scope.clone(),
            setter: self.summary.setter.clone(),
            display_names: self.roster.display_names(),
        });
    }

    pub fn cycle_summary_games(&mut self) {
        self.summary.scope.games = match &self.summary.scope.games {
            GameScope::Scored => GameScope::All,
            GameScope::All => match &self.game_id {
                Some(id) => GameScope::Single(id.clone()),
                None => GameScope::Scored,
            },
            GameScope::Single(_) => GameScope::Scored,
        };
        self.request_summary();
    }

    /// None, then 1..=5, then back to None.
    pub fn cycle_summary_set(&mut self) {
        self.summary.scope.set = match self.summary.scope.set {
            None => Some(1),
            Some(s) if s >= 5 => None,
            Some(s) => Some(s + 1),
        };
        self.request_summary();
    }

    pub fn cycle_summary_setter(&mut self) {
        let setters = self
            .summary
            .data
            .as_ref()
            .map(|s| s.setters.clone())
            .unwrap_or_default();
        self.summary.setter = match &self.summary.setter {
            None => setters.first().cloned(),
            Some(cur) => setters
                .iter()
                .position(|s| s == cur)
                .and_then(|i| setters.get(i + 1))
                .cloned(),
        };
        self.request_summary();
    }

    pub fn request_export(&mut self, path: String) {
        let Some(summary) = self.summary.data.clone() else {
            self.push_log("[WARN] Nothing to export yet");
            return;
        };
        self.outbox
            .push(ProviderCommand::ExportSummary { path, summary });
    }
}

/// Blank row directly below `row`, sharing its rally context.
pub fn row_after(row: &StatEvent) -> NewStatEvent {
    NewStatEvent {
        game_id: row.game_id.clone(),
        team_id: row.team_id.clone(),
        set: row.set,
        rally_id: row.rally_id,
        import_seq: row.import_seq + INSERT_SEQ_STEP,
        our_score: row.our_score,
        opp_score: row.opp_score,
        ..NewStatEvent::default()
    }
}

/// Ten blank rows continuing from the last row that carries any data,
/// or a fresh `set 1, rally 1, 0-0` block for an empty game.
pub fn bottom_block(log: &[StatEvent], game_id: &str, team_id: &str) -> Vec<NewStatEvent> {
    let last = log.iter().rev().find(|r| {
        r.rally_id.is_some()
            || r.set.is_some()
            || r.our_score.is_some()
            || r.opp_score.is_some()
            || r.import_seq != 0.0
    });
    let Some(last) = last else {
        return (0..BLOCK_ROWS)
            .map(|i| NewStatEvent {
                game_id: game_id.to_string(),
                team_id: team_id.to_string(),
                set: Some(1),
                rally_id: Some(1),
                import_seq: (i + 1) as f64,
                our_score: Some(0),
                opp_score: Some(0),
                ..NewStatEvent::default()
            })
            .collect();
    };
    let start = last.import_seq + 1.0;
    let game_id = if last.game_id.is_empty() {
        game_id.to_string()
    } else {
        last.game_id.clone()
    };
    let team_id = if last.team_id.is_empty() {
        team_id.to_string()
    } else {
        last.team_id.clone()
    };
    (0..BLOCK_ROWS)
        .map(|i| NewStatEvent {
            game_id: game_id.clone(),
            team_id: team_id.clone(),
            set: Some(last.set.unwrap_or(1)),
            rally_id: Some(last.rally_id.unwrap_or(1)),
            import_seq: round2(start + i as f64),
            our_score: Some(last.our_score.unwrap_or(0)),
            opp_score: Some(last.opp_score.unwrap_or(0)),
            ..NewStatEvent::default()
        })
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone)]
pub enum ProviderCommand {
    LoadGames {
        team_id: String,
    },
    LoadEvents {
        game_id: String,
    },
    PersistEdit {
        seq: u64,
        edit: AppliedEdit,
    },
    InsertRows {
        game_id: String,
        after: Option<String>,
        rows: Vec<NewStatEvent>,
    },
    DeleteRow {
        id: String,
    },
    LoadSummary {
        team_id: String,
        scope: SummaryScope,
        setter: Option<String>,
        display_names: HashMap<String, String>,
    },
    ExportSummary {
        path: String,
        summary: Summary,
    },
}

#[derive(Debug, Clone)]
pub enum Delta {
    SetGames {
        team_id: String,
        games: Vec<Game>,
    },
    SetLog {
        game_id: String,
        events: Vec<StatEvent>,
    },
    EditPersisted {
        seq: u64,
    },
    EditFailed {
        seq: u64,
        message: String,
        rollback: Vec<RowPatch>,
    },
    RowsInserted {
        game_id: String,
        after: Option<String>,
        rows: Vec<StatEvent>,
    },
    RowDeleted {
        id: String,
    },
    SetSummary(Summary),
    SummaryFailed(String),
    ExportStarted {
        path: String,
        total: usize,
    },
    ExportProgress {
        current: usize,
        total: usize,
        message: String,
    },
    ExportFinished {
        path: String,
        report: ExportReport,
    },
    ExportFailed {
        path: String,
        message: String,
    },
    Log(String),
}

pub fn apply_delta(state: &mut ReviewState, delta: Delta) {
    match delta {
        Delta::SetGames { team_id, games } => {
            if state.team_id.as_deref() != Some(team_id.as_str()) {
                return;
            }
            let selected_id = state.selected_game().map(|g| g.id.clone());
            state.games = games;
            state.games_loading = false;
            state.games_selected = selected_id
                .and_then(|id| state.games.iter().position(|g| g.id == id))
                .unwrap_or(0);
        }
        Delta::SetLog { game_id, events } => {
            // A reload for a game we already left.
            if state.game_id.as_deref() != Some(game_id.as_str()) {
                return;
            }
            state.log = events;
            state.log_loading = false;
            state.log_version += 1;
            state.clamp_selection();
            state.bus.publish(UiSignal::RowsReplaced);
            state.push_log(format!("[INFO] Loaded {} rows", state.log.len()));
        }
        Delta::EditPersisted { seq } => {
            if state.in_flight == Some(seq) {
                state.in_flight = None;
            }
            state.drain_pending();
        }
        Delta::EditFailed {
            seq,
            message,
            rollback,
        } => {
            state.log = edit::rollback(&state.log, &rollback);
            state.log_version += 1;
            state.bus.publish(UiSignal::RowsReplaced);
            state.push_log(format!("[WARN] Save failed, edit reverted: {message}"));
            if state.in_flight == Some(seq) {
                state.in_flight = None;
            }
            state.drain_pending();
        }
        Delta::RowsInserted {
            game_id,
            after,
            rows,
        } => {
            if state.game_id.as_deref() != Some(game_id.as_str()) {
                return;
            }
            let count = rows.len();
            let at = after
                .and_then(|id| state.log.iter().position(|r| r.id == id))
                .map(|i| i + 1)
                .unwrap_or(state.log.len());
            state.log.splice(at..at, rows);
            state.log_version += 1;
            state.bus.publish(UiSignal::RowsReplaced);
            state.push_log(format!("[INFO] Added {count} row(s)"));
        }
        Delta::RowDeleted { id } => {
            state.log.retain(|r| r.id != id);
            if let Some(frozen) = state.view.frozen.as_mut() {
                frozen.retain(|f| *f != id);
            }
            state.log_version += 1;
            state.clamp_selection();
            state.bus.publish(UiSignal::RowsReplaced);
            state.push_log("[INFO] Row deleted");
        }
        Delta::SetSummary(summary) => {
            state.summary.selected = state
                .summary
                .selected
                .min(summary.players.len().saturating_sub(1));
            state.summary.data = Some(summary);
            state.summary.loading = false;
        }
        Delta::SummaryFailed(message) => {
            state.summary.loading = false;
            state.push_log(format!("[WARN] Summary failed: {message}"));
        }
        Delta::ExportStarted { path, total } => {
            state.export.active = true;
            state.export.path = Some(path);
            state.export.total = total;
            state.export.current = 0;
            state.export.message = "Starting export".to_string();
            state.export.done = false;
            state.export.failed = false;
            state.export.last_updated = Some(Instant::now());
        }
        Delta::ExportProgress {
            current,
            total,
            message,
        } => {
            state.export.active = true;
            state.export.total = total;
            state.export.current = current;
            state.export.message = message;
            state.export.last_updated = Some(Instant::now());
        }
        Delta::ExportFinished { path, report } => {
            state.export.active = true;
            state.export.path = Some(path.clone());
            state.export.current = state.export.total;
            state.export.message = format!(
                "Done: {} players, {} player rows, {} totals, {} setting rows",
                report.players, report.player_rows, report.total_rows, report.setting_rows
            );
            state.export.done = true;
            state.export.last_updated = Some(Instant::now());
            state.push_log(format!("[INFO] Exported summary to {path}"));
        }
        Delta::ExportFailed { path, message } => {
            state.export.active = true;
            state.export.done = true;
            state.export.failed = true;
            state.export.message = message.clone();
            state.export.last_updated = Some(Instant::now());
            state.push_log(format!("[WARN] Export to {path} failed: {message}"));
        }
        Delta::Log(msg) => state.push_log(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, seq: f64) -> StatEvent {
        StatEvent {
            id: id.to_string(),
            game_id: "g1".to_string(),
            team_id: "t1".to_string(),
            set: Some(1),
            rally_id: Some(1),
            import_seq: seq,
            our_score: Some(0),
            opp_score: Some(0),
            ..StatEvent::default()
        }
    }

    fn loaded(rows: Vec<StatEvent>) -> ReviewState {
        let mut state = ReviewState::new();
        state.open_game("g1");
        state.take_commands();
        apply_delta(
            &mut state,
            Delta::SetLog {
                game_id: "g1".to_string(),
                events: rows,
            },
        );
        state
    }

    #[test]
    fn edits_queue_behind_the_one_in_flight() {
        let mut state = loaded(vec![row("a", 1.0), row("b", 2.0)]);
        state.submit_edit("a", Field::Player, "Avery");
        state.submit_edit("b", Field::Player, "Blake");
        let cmds = state.take_commands();
        assert_eq!(cmds.len(), 1);
        assert_eq!(state.log[1].player, None);

        let ProviderCommand::PersistEdit { seq, .. } = &cmds[0] else {
            panic!("expected a persist command");
        };
        apply_delta(&mut state, Delta::EditPersisted { seq: *seq });
        assert_eq!(state.log[1].player.as_deref(), Some("Blake"));
        assert_eq!(state.take_commands().len(), 1);
    }

    #[test]
    fn validation_errors_never_reach_the_worker() {
        let mut state = loaded(vec![row("a", 1.0)]);
        state.submit_edit("a", Field::Set, "two");
        assert!(state.take_commands().is_empty());
        assert!(state.logs.back().unwrap().starts_with("[WARN]"));
        assert!(!state.has_pending_writes());
    }

    #[test]
    fn stale_log_for_another_game_is_ignored() {
        let mut state = loaded(vec![row("a", 1.0)]);
        apply_delta(
            &mut state,
            Delta::SetLog {
                game_id: "other".to_string(),
                events: Vec::new(),
            },
        );
        assert_eq!(state.log.len(), 1);
    }

    #[test]
    fn bottom_block_continues_from_last_data_row() {
        let mut last = row("a", 4.0);
        last.set = Some(2);
        last.rally_id = Some(7);
        last.our_score = Some(5);
        let block = bottom_block(&[row("z", 1.0), last], "g1", "t1");
        assert_eq!(block.len(), BLOCK_ROWS);
        assert_eq!(block[0].import_seq, 5.0);
        assert_eq!(block[9].import_seq, 14.0);
        assert!(block.iter().all(|r| r.set == Some(2) && r.rally_id == Some(7)));
        assert_eq!(block[0].our_score, Some(5));

        let fresh = bottom_block(&[], "g9", "t9");
        assert_eq!(fresh[0].import_seq, 1.0);
        assert_eq!((fresh[0].set, fresh[0].rally_id), (Some(1), Some(1)));
        assert_eq!(fresh[0].game_id, "g9");
    }

    #[test]
    fn inserted_rows_land_after_their_anchor() {
        let mut state = loaded(vec![row("a", 1.0), row("b", 2.0)]);
        state.insert_row_after("a");
        let cmds = state.take_commands();
        let ProviderCommand::InsertRows { rows, .. } = &cmds[0] else {
            panic!("expected an insert");
        };
        assert!((rows[0].import_seq - 1.01).abs() < 1e-9);
        apply_delta(
            &mut state,
            Delta::RowsInserted {
                game_id: "g1".to_string(),
                after: Some("a".to_string()),
                rows: vec![rows[0].clone().into_event("n".to_string())],
            },
        );
        let ids: Vec<&str> = state.log.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "n", "b"]);
    }

    #[test]
    fn row_jump_falls_back_to_previous_timestamp() {
        let mut a = row("a", 1.0);
        a.timestamp = Some(12.5);
        let state = loaded(vec![a, row("b", 2.0)]);
        assert_eq!(state.row_jump_time("b"), Some(12.5));
        assert_eq!(state.row_jump_time("missing"), None);
    }
}
