use rayon::prelude::*;
use thiserror::Error;

use crate::derive::RowPatch;
use crate::stat_event::{Game, NewStatEvent, StatEvent};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("row {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug)]
pub struct PatchFailure {
    pub patch: RowPatch,
    pub error: StoreError,
}

/// Source of truth for games and their stat logs.
pub trait EventStore: Send + Sync {
    fn label(&self) -> &'static str;

    fn list_games(&self, team_id: &str) -> Result<Vec<Game>, StoreError>;

    /// Events for one game, ordered by `import_seq`.
    fn list_events(&self, game_id: &str) -> Result<Vec<StatEvent>, StoreError>;

    fn list_events_for_games(&self, game_ids: &[String]) -> Result<Vec<StatEvent>, StoreError> {
        let mut out = Vec::new();
        for id in game_ids {
            out.extend(self.list_events(id)?);
        }
        Ok(out)
    }

    fn patch_event(&self, patch: &RowPatch) -> Result<(), StoreError>;

    /// Patches are sent `batch_size` at a time, each batch concurrently.
    fn patch_events(&self, patches: &[RowPatch], batch_size: usize) -> Vec<PatchFailure> {
        let mut failures = Vec::new();
        for chunk in patches.chunks(batch_size.max(1)) {
            let batch: Vec<PatchFailure> = chunk
                .par_iter()
                .filter_map(|patch| {
                    self.patch_event(patch).err().map(|error| PatchFailure {
                        patch: patch.clone(),
                        error,
                    })
                })
                .collect();
            failures.extend(batch);
        }
        failures
    }

    fn insert_events(&self, rows: &[NewStatEvent]) -> Result<Vec<StatEvent>, StoreError>;

    fn delete_event(&self, id: &str) -> Result<(), StoreError>;
}
