use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::media::MediaElement;
use crate::rally::{Timeline, rally_at, rally_number, next_rally_start};
use crate::stat_event::StatEvent;

pub const DEFAULT_SUPPRESSION: Duration = Duration::from_millis(2100);
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);
pub const UPCOMING_LEN: usize = 3;
pub const INTRO_SKIP_THRESHOLD: f64 = 0.5;

/// What the overlay shows for the current playback position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub current_set: u32,
    pub rally_number: Option<usize>,
    pub score: (u32, u32),
    pub upcoming: Vec<StatEvent>,
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self {
            current_set: 1,
            rally_number: None,
            score: (0, 0),
            upcoming: Vec::new(),
        }
    }
}

impl PlaybackStatus {
    pub fn score_label(&self) -> String {
        format!("{} - {}", self.score.0, self.score.1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Skipped,
    /// Autoplay jumped over dead time to the next rally.
    Advanced { to: f64 },
    Updated,
}

#[derive(Debug)]
pub struct PlaybackTracker {
    status: PlaybackStatus,
    current_rally: Option<usize>,
    autoplay: bool,
    suppression: Duration,
    suppressed_until: Option<Instant>,
    override_set: Option<u32>,
    resume_after: Option<f64>,
}

impl Default for PlaybackTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPRESSION)
    }
}

impl PlaybackTracker {
    pub fn new(suppression: Duration) -> Self {
        Self {
            status: PlaybackStatus::default(),
            current_rally: None,
            autoplay: false,
            suppression,
            suppressed_until: None,
            override_set: None,
            resume_after: None,
        }
    }

    pub fn status(&self) -> &PlaybackStatus {
        &self.status
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn set_autoplay(&mut self, on: bool) {
        self.autoplay = on;
    }

    pub fn is_suppressed(&self, now: Instant) -> bool {
        self.suppressed_until.is_some_and(|until| now < until)
    }

    /// A set jump shows the new set at 0-0 for the suppression window, then
    /// holds the score until playback reaches `resume_after`.
    pub fn begin_set_jump(&mut self, now: Instant, set: u32, resume_after: Option<f64>) {
        self.suppressed_until = Some(now + self.suppression);
        self.override_set = Some(set);
        self.resume_after = resume_after;
        self.status.current_set = set;
        self.status.rally_number = Some(1);
        self.status.score = (0, 0);
    }

    pub fn reset(&mut self) {
        *self = Self {
            autoplay: self.autoplay,
            ..Self::new(self.suppression)
        };
    }

    pub fn tick<M: MediaElement + ?Sized>(
        &mut self,
        now: Instant,
        media: &mut M,
        timeline: &Timeline,
        log: &[StatEvent],
    ) -> TickOutcome {
        if log.is_empty() || timeline.is_empty() {
            return TickOutcome::Skipped;
        }
        let t = media.current_time();
        let found = rally_at(&timeline.rallies, t);
        if let Some(idx) = found {
            self.current_rally = Some(idx);
            let rally = &timeline.rallies[idx];
            if let Some(number) = rally_number(&timeline.by_set, rally) {
                self.status.current_set = rally.set;
                self.status.rally_number = Some(number);
            }
        }

        let index = found.or(self.current_rally);
        if self.autoplay
            && let Some(idx) = index
            && let Some(rally) = timeline.rallies.get(idx)
            && t > rally.end
            && idx + 1 < timeline.rallies.len()
            && let Some(next) = next_rally_start(&timeline.rallies, t)
        {
            debug!(from = t, to = next, "autoplay skipping to next rally");
            match media.seek(next) {
                Ok(()) => return TickOutcome::Advanced { to: next },
                Err(err) => warn!(to = next, error = %err, "autoplay skip rejected"),
            }
        }

        self.status.upcoming = upcoming_events(log, t, UPCOMING_LEN);

        if let Some(until) = self.suppressed_until {
            if now < until {
                if let Some(set) = self.override_set {
                    self.status.current_set = set;
                    self.status.score = (0, 0);
                }
                return TickOutcome::Skipped;
            }
            self.suppressed_until = None;
            self.override_set = None;
        }

        if media.is_paused() {
            return TickOutcome::Skipped;
        }
        if let Some(gate) = self.resume_after {
            if t < gate {
                return TickOutcome::Skipped;
            }
            self.resume_after = None;
        }

        match latest_scored(log, t) {
            Some(ev) => {
                self.status.score = (ev.our_score.unwrap_or(0), ev.opp_score.unwrap_or(0));
                self.status.current_set = ev.set.unwrap_or(1);
            }
            None => {
                self.status.score = (0, 0);
                self.status.current_set = 1;
            }
        }
        TickOutcome::Updated
    }

    /// With autoplay on, jump past an intro that precedes the first rally.
    pub fn skip_intro<M: MediaElement + ?Sized>(&self, media: &mut M, timeline: &Timeline) -> bool {
        let Some(first) = timeline.rallies.first() else {
            return false;
        };
        if self.autoplay
            && media.current_time() < first.start - 1.0
            && first.start > INTRO_SKIP_THRESHOLD
        {
            return match media.seek(first.start) {
                Ok(()) => true,
                Err(err) => {
                    warn!(to = first.start, error = %err, "intro skip rejected");
                    false
                }
            };
        }
        false
    }
}

/// Next `limit` events strictly after `t`, by timestamp.
pub fn upcoming_events(log: &[StatEvent], t: f64, limit: usize) -> Vec<StatEvent> {
    let mut future: Vec<&StatEvent> = log
        .iter()
        .filter(|e| e.timestamp.is_some_and(|ts| ts > t))
        .collect();
    future.sort_by(|a, b| {
        a.timestamp
            .unwrap_or_default()
            .total_cmp(&b.timestamp.unwrap_or_default())
    });
    future.into_iter().take(limit).cloned().collect()
}

/// Most recent event at or before `t` that carries both scores. Ties go to
/// the later row in the log.
pub fn latest_scored(log: &[StatEvent], t: f64) -> Option<&StatEvent> {
    log.iter()
        .filter(|e| e.score().is_some() && e.timestamp.is_some_and(|ts| ts <= t))
        .fold(None, |best: Option<&StatEvent>, ev| match best {
            Some(b) if b.timestamp > ev.timestamp => Some(b),
            _ => Some(ev),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::recording::RecordingMedia;

    fn ev(id: &str, set: u32, rally: u32, ts: f64, score: (u32, u32)) -> StatEvent {
        StatEvent {
            id: id.to_string(),
            set: Some(set),
            rally_id: Some(rally),
            timestamp: Some(ts),
            player: Some("Alex".to_string()),
            action_type: Some("Serve".to_string()),
            our_score: Some(score.0),
            opp_score: Some(score.1),
            ..StatEvent::default()
        }
    }

    fn log() -> Vec<StatEvent> {
        vec![
            ev("a", 1, 1, 10.0, (1, 0)),
            ev("b", 1, 2, 30.0, (1, 1)),
            ev("c", 2, 1, 60.0, (0, 1)),
            ev("d", 2, 2, 80.0, (1, 1)),
        ]
    }

    fn playing_at(t: f64) -> RecordingMedia {
        let mut media = RecordingMedia::new();
        media.paused = false;
        media.set_time(t);
        media
    }

    #[test]
    fn score_follows_latest_scored_event() {
        let log = log();
        let timeline = Timeline::build(&log, 3.0);
        let mut tracker = PlaybackTracker::default();
        let mut media = playing_at(31.0);

        assert_eq!(
            tracker.tick(Instant::now(), &mut media, &timeline, &log),
            TickOutcome::Updated
        );
        let status = tracker.status();
        assert_eq!(status.score, (1, 1));
        assert_eq!(status.current_set, 1);
        assert_eq!(status.rally_number, Some(2));
        let ids: Vec<_> = status.upcoming.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn autoplay_jumps_dead_time() {
        let log = log();
        let timeline = Timeline::build(&log, 3.0);
        let mut tracker = PlaybackTracker::default();
        tracker.set_autoplay(true);

        let mut media = playing_at(12.0);
        tracker.tick(Instant::now(), &mut media, &timeline, &log);
        media.set_time(20.0);
        assert_eq!(
            tracker.tick(Instant::now(), &mut media, &timeline, &log),
            TickOutcome::Advanced { to: 29.0 }
        );
        assert_eq!(media.current_time(), 29.0);
    }

    #[test]
    fn set_jump_suppresses_then_gates_updates() {
        let log = log();
        let timeline = Timeline::build(&log, 3.0);
        let mut tracker = PlaybackTracker::default();
        let start = Instant::now();
        tracker.begin_set_jump(start, 2, Some(60.0));

        let mut media = playing_at(59.5);
        tracker.tick(start, &mut media, &timeline, &log);
        assert_eq!(tracker.status().current_set, 2);
        assert_eq!(tracker.status().score, (0, 0));

        let later = start + Duration::from_secs(3);
        assert_eq!(
            tracker.tick(later, &mut media, &timeline, &log),
            TickOutcome::Skipped
        );
        assert_eq!(tracker.status().score, (0, 0));

        media.set_time(61.0);
        tracker.tick(later, &mut media, &timeline, &log);
        assert_eq!(tracker.status().score, (0, 1));
        assert_eq!(tracker.status().current_set, 2);
    }

    #[test]
    fn intro_is_skipped_only_with_autoplay() {
        let log = log();
        let timeline = Timeline::build(&log, 3.0);
        let mut tracker = PlaybackTracker::default();
        let mut media = playing_at(0.0);
        assert!(!tracker.skip_intro(&mut media, &timeline));
        tracker.set_autoplay(true);
        assert!(tracker.skip_intro(&mut media, &timeline));
        assert_eq!(media.current_time(), 9.0);
    }
}
