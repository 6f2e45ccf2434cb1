use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::filter::ViewState;
use crate::state::ReviewState;

const CACHE_DIR: &str = "volley_review";
const CACHE_FILE: &str = "cache.json";
const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheFile {
    version: u32,
    /// Last playback position per game id, in seconds.
    #[serde(default)]
    pub video_times: HashMap<String, f64>,
    #[serde(default)]
    pub views: HashMap<String, ViewState>,
    #[serde(default)]
    pub last_game: Option<String>,
}

impl CacheFile {
    pub fn new() -> Self {
        Self {
            version: CACHE_VERSION,
            ..Self::default()
        }
    }
}

pub fn load_into_state(state: &mut ReviewState) {
    let Some(path) = cache_path() else {
        return;
    };
    load_into_state_from(state, &path);
}

pub fn load_into_state_from(state: &mut ReviewState, path: &Path) {
    let Some(cache) = load_cache_file(path) else {
        return;
    };
    state.saved_positions = cache.video_times;
    state.saved_views = cache.views;
    if state.game_id.is_none() {
        state.resume_game = cache.last_game;
    }
}

pub fn save_from_state(state: &ReviewState) {
    let Some(path) = cache_path() else {
        return;
    };
    save_from_state_to(state, &path);
}

pub fn save_from_state_to(state: &ReviewState, path: &Path) {
    let Some(dir) = path.parent() else {
        return;
    };
    let _ = fs::create_dir_all(dir);

    let mut cache = load_cache_file(path).unwrap_or_else(CacheFile::new);
    cache.version = CACHE_VERSION;
    cache.video_times = state.saved_positions.clone();
    cache.views = state.saved_views.clone();
    if let Some(game_id) = state.game_id.as_ref() {
        cache.views.insert(game_id.clone(), state.view.clone());
        cache.last_game = Some(game_id.clone());
    }

    if let Ok(json) = serde_json::to_string(&cache) {
        let tmp = path.with_extension("json.tmp");
        if fs::write(&tmp, json).is_ok() {
            let _ = fs::rename(&tmp, path);
        }
    }
}

/// Missing, unreadable and older-version files all read as "no cache".
pub fn load_cache_file(path: &Path) -> Option<CacheFile> {
    let raw = fs::read_to_string(path).ok()?;
    let cache = serde_json::from_str::<CacheFile>(&raw).ok()?;
    if cache.version != CACHE_VERSION {
        return None;
    }
    Some(cache)
}

pub fn cache_dir() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    // Fallback to ~/.cache on linux-like systems.
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn cache_path() -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join(CACHE_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat_event::Field;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("volley_review_persist_{}_{name}", std::process::id()))
            .join(CACHE_FILE)
    }

    #[test]
    fn positions_and_views_survive_a_round_trip() {
        let path = temp_path("round_trip");
        let mut state = ReviewState::new();
        state.game_id = Some("g1".to_string());
        state.saved_positions.insert("g1".to_string(), 312.5);
        state.view.toggle_column(Field::Notes);
        state.view.toggle_sort(Field::Player);
        save_from_state_to(&state, &path);

        let mut restored = ReviewState::new();
        load_into_state_from(&mut restored, &path);
        assert_eq!(restored.saved_positions.get("g1"), Some(&312.5));
        assert_eq!(restored.saved_views.get("g1"), Some(&state.view));
        assert_eq!(restored.resume_game.as_deref(), Some("g1"));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn version_mismatch_is_ignored() {
        let path = temp_path("version");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"version":0,"video_times":{"g1":5.0}}"#).unwrap();
        assert!(load_cache_file(&path).is_none());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
