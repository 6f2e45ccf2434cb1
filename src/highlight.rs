//! Plays a list of time windows back to back.
//!
//! Each `play` call opens a new session and hands back its token. Time
//! updates carry the token they were issued for; once a newer session
//! exists (or `stop` was called) those updates are ignored, so a stale
//! sequence can never seek or pause the player again.

use tracing::{debug, info, warn};

use crate::media::MediaElement;
use crate::rally::Rally;
use crate::stat_event::StatEvent;

pub const DEFAULT_PRE_BUFFER: f64 = 2.0;
pub const DEFAULT_PLAY_DURATION: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

/// One window per timestamp, `[t - pre, t + duration]`, sorted and merged
/// whenever the next lead-in starts before the current window ends.
pub fn build_sequences(timestamps: &[f64], pre_buffer: f64, duration: f64) -> Vec<Window> {
    let mut sorted: Vec<f64> = timestamps.iter().copied().filter(|t| t.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);

    let mut merged: Vec<Window> = Vec::new();
    for t in sorted {
        let end = t + duration;
        match merged.last_mut() {
            Some(last) if t - pre_buffer <= last.end => last.end = last.end.max(end),
            _ => merged.push(Window {
                start: (t - pre_buffer).max(0.0),
                end,
            }),
        }
    }
    merged
}

pub fn sequences_for_events(events: &[StatEvent], pre_buffer: f64, duration: f64) -> Vec<Window> {
    let stamps: Vec<f64> = events.iter().filter_map(|e| e.timestamp).collect();
    build_sequences(&stamps, pre_buffer, duration)
}

/// Whole rallies that contain at least one of `events`.
pub fn rally_sequences(rallies: &[Rally], events: &[StatEvent]) -> Vec<Window> {
    let mut out: Vec<Window> = Vec::new();
    for rally in rallies {
        let touched = events.iter().any(|e| {
            e.set == Some(rally.set) && e.rally_id == Some(rally.rally_id) && e.timestamp.is_some()
        });
        if !touched {
            continue;
        }
        match out.last_mut() {
            Some(last) if rally.start <= last.end => last.end = last.end.max(rally.end),
            _ => out.push(Window {
                start: rally.start,
                end: rally.end,
            }),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// The token belongs to a cancelled or finished session.
    Stale,
    Waiting,
    Advanced { index: usize },
    Finished,
}

#[derive(Debug)]
struct ActiveSession {
    token: SessionToken,
    windows: Vec<Window>,
    index: usize,
}

#[derive(Debug, Default)]
pub struct HighlightSequencer {
    session: u64,
    active: Option<ActiveSession>,
}

impl HighlightSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whatever was running and start on `windows`.
    pub fn play<M: MediaElement + ?Sized>(
        &mut self,
        media: &mut M,
        windows: Vec<Window>,
    ) -> SessionToken {
        self.session += 1;
        let token = SessionToken(self.session);
        info!(session = self.session, windows = windows.len(), "highlight playback started");
        self.active = Some(ActiveSession {
            token,
            windows,
            index: 0,
        });
        self.start_current(media);
        token
    }

    /// Halts progression without touching the media; callers that stop the
    /// reel outright pause it themselves.
    pub fn stop(&mut self) -> bool {
        self.session += 1;
        let was_active = self.active.take().is_some();
        if was_active {
            info!(session = self.session, "highlight playback stopped");
        }
        was_active
    }

    pub fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_token(&self) -> Option<SessionToken> {
        self.active.as_ref().map(|a| a.token)
    }

    pub fn is_current(&self, token: SessionToken) -> bool {
        self.current_token() == Some(token)
    }

    pub fn current_window(&self) -> Option<(usize, usize, Window)> {
        let active = self.active.as_ref()?;
        let window = active.windows.get(active.index)?;
        Some((active.index, active.windows.len(), *window))
    }

    pub fn on_time_update<M: MediaElement + ?Sized>(
        &mut self,
        token: SessionToken,
        media: &mut M,
    ) -> Progress {
        if !self.is_current(token) {
            debug!(?token, "ignoring stale highlight continuation");
            return Progress::Stale;
        }
        let Some(window) = self.current_window().map(|(_, _, w)| w) else {
            return self.finish();
        };
        if media.current_time() < window.end {
            return Progress::Waiting;
        }
        media.pause();
        if let Some(active) = self.active.as_mut() {
            active.index += 1;
        }
        self.start_current(media)
    }

    /// Seek to the current window and play it. Windows whose seek or play is
    /// rejected are skipped.
    fn start_current<M: MediaElement + ?Sized>(&mut self, media: &mut M) -> Progress {
        loop {
            let Some((index, _, window)) = self.current_window() else {
                return self.finish();
            };
            match media.seek(window.start).and_then(|()| media.play()) {
                Ok(()) => return Progress::Advanced { index },
                Err(err) => {
                    warn!(index, start = window.start, error = %err, "skipping highlight window");
                    if let Some(active) = self.active.as_mut() {
                        active.index += 1;
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> Progress {
        if self.active.take().is_some() {
            self.session += 1;
            info!("highlight playback finished");
        }
        Progress::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::recording::{MediaCall, RecordingMedia};

    #[test]
    fn windows_merge_when_they_touch() {
        let windows = build_sequences(&[10.0, 12.0, 30.0, 1.0], 2.0, 3.0);
        assert_eq!(
            windows,
            vec![
                Window { start: 0.0, end: 4.0 },
                Window { start: 8.0, end: 15.0 },
                Window { start: 28.0, end: 33.0 },
            ]
        );
    }

    #[test]
    fn plays_each_window_then_finishes() {
        let mut media = RecordingMedia::new();
        let mut seq = HighlightSequencer::new();
        let token = seq.play(&mut media, build_sequences(&[10.0, 40.0], 2.0, 3.0));
        assert_eq!(media.calls, vec![MediaCall::Seek(8.0), MediaCall::Play]);

        media.set_time(9.0);
        assert_eq!(seq.on_time_update(token, &mut media), Progress::Waiting);
        media.set_time(13.0);
        assert_eq!(
            seq.on_time_update(token, &mut media),
            Progress::Advanced { index: 1 }
        );
        media.set_time(43.0);
        assert_eq!(seq.on_time_update(token, &mut media), Progress::Finished);
        assert!(!seq.is_playing());
        assert_eq!(
            media.calls,
            vec![
                MediaCall::Seek(8.0),
                MediaCall::Play,
                MediaCall::Pause,
                MediaCall::Seek(38.0),
                MediaCall::Play,
                MediaCall::Pause,
            ]
        );
    }

    #[test]
    fn rejected_play_skips_the_window() {
        let mut media = RecordingMedia::new();
        media.reject_play_at = Some(0);
        let mut seq = HighlightSequencer::new();
        seq.play(&mut media, build_sequences(&[10.0, 40.0], 2.0, 3.0));
        assert_eq!(media.seeks(), vec![8.0, 38.0]);
        assert_eq!(seq.current_window().map(|(i, _, _)| i), Some(1));
    }

    #[test]
    fn rejected_seek_skips_the_window_without_playing_it() {
        let mut media = RecordingMedia::new();
        media.reject_seek_at = Some(0);
        let mut seq = HighlightSequencer::new();
        seq.play(&mut media, build_sequences(&[10.0, 40.0], 2.0, 3.0));
        assert_eq!(
            media.calls,
            vec![MediaCall::Seek(8.0), MediaCall::Seek(38.0), MediaCall::Play]
        );
        assert_eq!(seq.current_window().map(|(i, _, _)| i), Some(1));
    }
}
