mod common;

use std::sync::mpsc::{self, Receiver, Sender};

use common::{FlakyStore, fixture, fixture_game, row};
use volley_review::local_store::SqliteStore;
use volley_review::stat_event::Field;
use volley_review::state::{BLOCK_ROWS, Delta, ReviewState, Screen, apply_delta};
use volley_review::store::EventStore;
use volley_review::sync::{SyncOptions, build_write_pool, run_command};

struct Harness<S: EventStore> {
    store: S,
    pool: Option<rayon::ThreadPool>,
    opts: SyncOptions,
    tx: Sender<Delta>,
    rx: Receiver<Delta>,
    state: ReviewState,
}

impl<S: EventStore> Harness<S> {
    fn new(store: S) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut state = ReviewState::new();
        state.team_id = Some("7".to_string());
        Self {
            store,
            pool: build_write_pool(2),
            opts: SyncOptions { patch_batch: 4 },
            tx,
            rx,
            state,
        }
    }

    /// Run queued commands on this thread until the state stops asking for more.
    fn pump(&mut self) {
        loop {
            let cmds = self.state.take_commands();
            if cmds.is_empty() {
                break;
            }
            for cmd in cmds {
                run_command(&self.store, &self.pool, &self.opts, cmd, &self.tx);
            }
            while let Ok(delta) = self.rx.try_recv() {
                apply_delta(&mut self.state, delta);
            }
        }
    }
}

fn practice_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert_game(&fixture_game()).unwrap();
    store.replace_events("42", &fixture()).unwrap();
    store
}

fn opened<S: EventStore>(store: S) -> Harness<S> {
    let mut h = Harness::new(store);
    h.state.request_games();
    h.pump();
    h.state.open_game("42");
    h.pump();
    h
}

#[test]
fn games_and_log_load_through_the_worker() {
    let h = opened(practice_store());
    assert_eq!(h.state.games.len(), 1);
    assert!(h.state.games[0].is_scored);
    assert_eq!(h.state.screen, Screen::Grid);
    assert!(!h.state.log_loading);
    assert_eq!(h.state.log.len(), 11);
    assert_eq!(h.state.log[0].id, "101");
}

#[test]
fn queued_edits_land_in_order() {
    let mut h = opened(practice_store());
    h.state.submit_edit("107", Field::Result, "won");
    h.state.submit_edit("105", Field::Notes, "good serve");
    h.state.submit_edit("108", Field::OurScore, "5");
    h.pump();
    assert!(!h.state.has_pending_writes());

    let stored = h.store.list_events("42").unwrap();
    assert_eq!(row(&stored, "107").score(), Some((2, 0)));
    assert_eq!(row(&stored, "105").notes.as_deref(), Some("good serve"));
    assert_eq!(row(&stored, "108").score(), Some((5, 0)));
    assert_eq!(stored, h.state.log);
}

#[test]
fn rows_can_be_inserted_and_deleted() {
    let mut h = opened(practice_store());
    h.state.insert_row_after("104");
    h.pump();
    assert_eq!(h.state.log.len(), 12);
    let inserted = h.state.log[4].clone();
    assert!((inserted.import_seq - 4.01).abs() < 1e-9);
    assert_eq!(inserted.score(), Some((1, 0)));

    h.state.delete_row(&inserted.id);
    h.pump();
    assert_eq!(h.state.log.len(), 11);
    assert!(h.state.log.iter().all(|r| r.id != inserted.id));

    h.state.add_block();
    h.pump();
    assert_eq!(h.state.log.len(), 11 + BLOCK_ROWS);
    let last = h.state.log.last().unwrap();
    assert_eq!(last.import_seq, 21.0);
    assert_eq!((last.set, last.rally_id), (Some(2), Some(1)));
    assert_eq!(h.store.list_events("42").unwrap().len(), 11 + BLOCK_ROWS);
}

#[test]
fn summary_is_built_on_the_worker() {
    let mut h = opened(practice_store());
    h.state.request_summary();
    assert!(h.state.summary.loading);
    h.pump();
    let summary = h.state.summary.data.as_ref().unwrap();
    assert!(!h.state.summary.loading);
    assert_eq!(summary.assists.get("Casey"), Some(&2));
    assert_eq!(summary.players.len(), 7);

    h.state.cycle_summary_set();
    h.pump();
    assert_eq!(h.state.summary.scope.set, Some(1));
    let summary = h.state.summary.data.as_ref().unwrap();
    assert_eq!(summary.assists.get("Casey"), Some(&1));
}

#[test]
fn failed_save_reverts_the_optimistic_edit() {
    let mut h = opened(FlakyStore::failing(&["107"]));
    h.state.submit_edit("107", Field::Result, "won");
    assert_eq!(row(&h.state.log, "108").score(), Some((2, 0)));
    h.pump();

    assert_eq!(row(&h.state.log, "107").result.as_deref(), Some("Lost Point"));
    assert_eq!(row(&h.state.log, "108").score(), Some((1, 1)));
    assert!(h.state.logs.iter().any(|l| l.starts_with("[WARN] Save failed")));
    assert!(!h.state.has_pending_writes());
}

#[test]
fn failed_insert_leaves_the_log_alone() {
    let mut h = opened(FlakyStore::default());
    h.state.add_block();
    h.pump();
    assert_eq!(h.state.log.len(), 11);
    assert!(h.state.logs.back().unwrap().contains("Failed to add rows"));
}
