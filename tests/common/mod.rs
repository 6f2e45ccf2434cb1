#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use volley_review::derive::RowPatch;
use volley_review::stat_event::{Game, NewStatEvent, StatEvent};
use volley_review::store::{EventStore, StoreError};

pub const FIXTURE: &str = include_str!("../fixtures/stats_game.json");

/// Two sets of game 42 for team 7, as the stats resource returns them.
pub fn fixture() -> Vec<StatEvent> {
    serde_json::from_str(FIXTURE).expect("valid fixture json")
}

pub fn fixture_game() -> Game {
    Game {
        id: "42".to_string(),
        team_id: "7".to_string(),
        title: "Home vs Ridgeview".to_string(),
        date: Some("2026-03-01".to_string()),
        is_scored: true,
        video_url: None,
    }
}

pub fn row<'a>(log: &'a [StatEvent], id: &str) -> &'a StatEvent {
    log.iter()
        .find(|r| r.id == id)
        .unwrap_or_else(|| panic!("row {id} missing"))
}

/// Accepts every write except patches for the listed row ids.
#[derive(Default)]
pub struct FlakyStore {
    fail_ids: HashSet<String>,
    patched: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            fail_ids: ids.iter().map(|s| s.to_string()).collect(),
            patched: Mutex::new(Vec::new()),
        }
    }

    pub fn patched(&self) -> Vec<String> {
        self.patched.lock().expect("patched lock poisoned").clone()
    }
}

impl EventStore for FlakyStore {
    fn label(&self) -> &'static str {
        "flaky"
    }

    fn list_games(&self, _team_id: &str) -> Result<Vec<Game>, StoreError> {
        Ok(vec![fixture_game()])
    }

    fn list_events(&self, _game_id: &str) -> Result<Vec<StatEvent>, StoreError> {
        Ok(fixture())
    }

    fn patch_event(&self, patch: &RowPatch) -> Result<(), StoreError> {
        if self.fail_ids.contains(&patch.id) {
            return Err(StoreError::Http {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.patched
            .lock()
            .expect("patched lock poisoned")
            .push(patch.id.clone());
        Ok(())
    }

    fn insert_events(&self, _rows: &[NewStatEvent]) -> Result<Vec<StatEvent>, StoreError> {
        Err(StoreError::Other("inserts disabled".to_string()))
    }

    fn delete_event(&self, id: &str) -> Result<(), StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }
}
