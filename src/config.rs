use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::highlight::{DEFAULT_PLAY_DURATION, DEFAULT_PRE_BUFFER};
use crate::rally::{DEFAULT_END_BUFFER, NAVIGATION_BUFFER};
use crate::tracker::DEFAULT_SUPPRESSION;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_PATCH_BATCH: usize = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    pub highlight_pre: f64,
    pub highlight_duration: f64,
    pub rally_end_buffer: f64,
    pub rally_navigation_buffer: f64,
    pub suppression: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            highlight_pre: DEFAULT_PRE_BUFFER,
            highlight_duration: DEFAULT_PLAY_DURATION,
            rally_end_buffer: DEFAULT_END_BUFFER,
            rally_navigation_buffer: NAVIGATION_BUFFER,
            suppression: DEFAULT_SUPPRESSION,
        }
    }
}

impl PlaybackConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            highlight_pre: env_f64("VOLLEY_HIGHLIGHT_PRE", defaults.highlight_pre, 0.0, 30.0),
            highlight_duration: env_f64(
                "VOLLEY_HIGHLIGHT_DURATION",
                defaults.highlight_duration,
                0.5,
                60.0,
            ),
            rally_end_buffer: env_f64(
                "VOLLEY_RALLY_END_BUFFER",
                defaults.rally_end_buffer,
                0.0,
                30.0,
            ),
            rally_navigation_buffer: defaults.rally_navigation_buffer,
            suppression: Duration::from_millis(
                env::var("VOLLEY_STAT_SUPPRESS_MS")
                    .ok()
                    .and_then(|val| val.parse::<u64>().ok())
                    .unwrap_or(defaults.suppression.as_millis() as u64)
                    .clamp(0, 10_000),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_url: String,
    pub request_timeout: Duration,
    pub patch_batch: usize,
    pub db_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub team_id: Option<String>,
    pub game_id: Option<String>,
    pub playback: PlaybackConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("VOLLEY_API_URL")
                .ok()
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            request_timeout: Duration::from_secs(
                env::var("VOLLEY_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|val| val.parse::<u64>().ok())
                    .unwrap_or(10)
                    .clamp(1, 120),
            ),
            patch_batch: env::var("VOLLEY_PATCH_BATCH")
                .ok()
                .and_then(|val| val.parse::<usize>().ok())
                .unwrap_or(DEFAULT_PATCH_BATCH)
                .clamp(1, 64),
            db_path: opt_env("VOLLEY_DB_PATH").map(PathBuf::from),
            log_path: opt_env("VOLLEY_LOG_PATH").map(PathBuf::from),
            team_id: opt_env("VOLLEY_TEAM_ID"),
            game_id: opt_env("VOLLEY_GAME_ID"),
            playback: PlaybackConfig::from_env(),
        }
    }
}

fn env_f64(key: &str, default: f64, min: f64, max: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|val| val.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
