use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::PlaybackConfig;
use crate::highlight::{self, HighlightSequencer, Progress, Window};
use crate::media::{MediaElement, MediaError};
use crate::rally::{Timeline, next_rally_start, previous_rally_start};
use crate::stat_event::StatEvent;
use crate::tracker::{PlaybackStatus, PlaybackTracker, TickOutcome};

pub const REWIND_SECS: f64 = 3.0;
pub const FORWARD_SECS: f64 = 10.0;
pub const FRAME_SECS: f64 = 1.0 / 60.0;
/// Seconds of lead-in when jumping to a logged touch.
pub const JUMP_LEAD_IN: f64 = 1.0;
/// Pressing "previous set" this soon after a set starts goes back a whole set.
pub const SET_RESTART_WINDOW: f64 = 2.0;

/// Owns the media element and everything that moves its playhead.
///
/// Manual navigation always cancels a running highlight session first, so
/// the latest request is the one the player follows.
pub struct PlayerController<M: MediaElement> {
    media: M,
    sequencer: HighlightSequencer,
    tracker: PlaybackTracker,
    timeline: Timeline,
    log: Vec<StatEvent>,
    config: PlaybackConfig,
}

impl<M: MediaElement> PlayerController<M> {
    pub fn new(media: M, config: PlaybackConfig) -> Self {
        Self {
            media,
            sequencer: HighlightSequencer::new(),
            tracker: PlaybackTracker::new(config.suppression),
            timeline: Timeline::default(),
            log: Vec::new(),
            config,
        }
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn status(&self) -> &PlaybackStatus {
        self.tracker.status()
    }

    pub fn autoplay(&self) -> bool {
        self.tracker.autoplay()
    }

    pub fn is_sequencing(&self) -> bool {
        self.sequencer.is_playing()
    }

    pub fn sequence_progress(&self) -> Option<(usize, usize, Window)> {
        self.sequencer.current_window()
    }

    /// Rebuild rally windows after the log changed.
    pub fn load_log(&mut self, log: &[StatEvent]) {
        self.log = log.to_vec();
        self.timeline = Timeline::build(log, self.config.rally_end_buffer);
        debug!(rallies = self.timeline.rallies.len(), "timeline rebuilt");
    }

    /// Drive playback from a time update; highlight sessions take precedence
    /// over the autoplay skip.
    pub fn on_time_update(&mut self, now: Instant) -> TickOutcome {
        if let Some(token) = self.sequencer.current_token()
            && self.sequencer.on_time_update(token, &mut self.media) != Progress::Stale
            && self.sequencer.is_playing()
        {
            self.tracker
                .tick(now, &mut NoSeek(&mut self.media), &self.timeline, &self.log);
            return TickOutcome::Updated;
        }
        self.tracker
            .tick(now, &mut self.media, &self.timeline, &self.log)
    }

    pub fn play_windows(&mut self, windows: Vec<Window>) -> bool {
        if windows.is_empty() {
            return false;
        }
        self.tracker.set_autoplay(false);
        self.sequencer.play(&mut self.media, windows);
        true
    }

    /// Highlight reel of the given (usually filtered) touches.
    pub fn play_filtered(&mut self, events: &[StatEvent]) -> bool {
        let windows = highlight::sequences_for_events(
            events,
            self.config.highlight_pre,
            self.config.highlight_duration,
        );
        info!(touches = events.len(), windows = windows.len(), "playing filtered touches");
        self.play_windows(windows)
    }

    /// Full rallies containing any of the given touches.
    pub fn play_filtered_rallies(&mut self, events: &[StatEvent]) -> bool {
        let windows = highlight::rally_sequences(&self.timeline.rallies, events);
        self.play_windows(windows)
    }

    /// Ends the reel and pauses where the media is.
    pub fn stop_highlights(&mut self) -> bool {
        let was_active = self.sequencer.stop();
        if was_active {
            self.media.pause();
        }
        was_active
    }

    pub fn toggle_play(&mut self) -> Result<(), MediaError> {
        if self.media.is_paused() {
            self.media.play()
        } else {
            self.media.pause();
            Ok(())
        }
    }

    pub fn toggle_autoplay(&mut self) -> bool {
        let on = !self.tracker.autoplay();
        self.tracker.set_autoplay(on);
        if on {
            self.tracker.skip_intro(&mut self.media, &self.timeline);
        }
        on
    }

    pub fn skip_intro(&mut self) -> bool {
        self.tracker.skip_intro(&mut self.media, &self.timeline)
    }

    /// Seek requested by the user. Cancels highlights; a rejected seek is
    /// logged and reported as `false`.
    pub fn seek(&mut self, t: f64) -> bool {
        self.sequencer.stop();
        let t = t.clamp(0.0, self.media.duration());
        match self.media.seek(t) {
            Ok(()) => true,
            Err(err) => {
                warn!(to = t, error = %err, "seek rejected");
                false
            }
        }
    }

    /// Jump to a logged touch with a short lead-in.
    pub fn jump_to_time(&mut self, timestamp: f64) -> bool {
        self.seek((timestamp - JUMP_LEAD_IN).max(0.0))
    }

    pub fn rewind(&mut self) {
        let t = self.media.current_time() - REWIND_SECS;
        self.seek(t.max(0.0));
    }

    pub fn forward(&mut self) {
        let t = self.media.current_time() + FORWARD_SECS;
        self.seek(t);
    }

    /// Frame stepping only applies while paused.
    pub fn step_frame(&mut self, forward: bool) -> bool {
        if !self.media.is_paused() {
            return false;
        }
        let delta = if forward { FRAME_SECS } else { -FRAME_SECS };
        let t = self.media.current_time() + delta;
        self.seek(t);
        true
    }

    /// Digit seek: `n` tenths of the way through. Turns autoplay off.
    pub fn seek_fraction(&mut self, tenths: u8) {
        let fraction = f64::from(tenths.min(9)) / 10.0;
        self.tracker.set_autoplay(false);
        let t = fraction * self.media.duration();
        self.seek(t);
    }

    pub fn next_rally(&mut self) -> Option<f64> {
        let next = next_rally_start(&self.timeline.rallies, self.media.current_time())?;
        self.seek(next).then_some(next)
    }

    pub fn previous_rally(&mut self) -> Option<f64> {
        let prev = previous_rally_start(
            &self.timeline.rallies,
            self.media.current_time(),
            self.config.rally_navigation_buffer,
        )?;
        self.seek(prev).then_some(prev)
    }

    /// Seek to the first rally of `set`, showing it at 0-0 until play reaches
    /// the first touch after that rally starts.
    pub fn seek_to_set(&mut self, set: u32, now: Instant) -> bool {
        let Some(first) = self.timeline.first_of_set(set).copied() else {
            return false;
        };
        if !self.seek(first.start) {
            return false;
        }
        let resume_after = self
            .log
            .iter()
            .filter_map(|e| e.timestamp)
            .find(|ts| *ts > first.start);
        self.tracker.begin_set_jump(now, set, resume_after);
        info!(set, start = first.start, "jumped to set");
        true
    }

    pub fn next_set(&mut self, now: Instant) -> bool {
        let current = self.tracker.status().current_set;
        let next = self.timeline.sets().into_iter().find(|s| *s > current);
        match next {
            Some(set) => self.seek_to_set(set, now),
            None => false,
        }
    }

    /// Restart the current set, or go to the previous one when already at its start.
    pub fn previous_set(&mut self, now: Instant) -> bool {
        let current = self.tracker.status().current_set;
        let Some(first) = self.timeline.first_of_set(current).copied() else {
            return false;
        };
        let t = self.media.current_time();
        let target = if t - first.start <= SET_RESTART_WINDOW {
            self.timeline
                .sets()
                .into_iter()
                .rev()
                .find(|s| *s < current)
                .unwrap_or(current)
        } else {
            current
        };
        self.seek_to_set(target, now)
    }
}

/// Lets the tracker refresh the overlay during a highlight session without
/// the autoplay skip moving the playhead.
struct NoSeek<'a, M: MediaElement>(&'a mut M);

impl<M: MediaElement> MediaElement for NoSeek<'_, M> {
    fn current_time(&self) -> f64 {
        self.0.current_time()
    }

    fn duration(&self) -> f64 {
        self.0.duration()
    }

    fn is_paused(&self) -> bool {
        self.0.is_paused()
    }

    fn seek(&mut self, _time: f64) -> Result<(), MediaError> {
        Ok(())
    }

    fn play(&mut self) -> Result<(), MediaError> {
        Ok(())
    }

    fn pause(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::recording::{MediaCall, RecordingMedia};

    fn ev(id: &str, set: u32, rally: u32, ts: f64) -> StatEvent {
        StatEvent {
            id: id.to_string(),
            set: Some(set),
            rally_id: Some(rally),
            timestamp: Some(ts),
            player: Some("Alex".to_string()),
            action_type: Some("Serve".to_string()),
            our_score: Some(0),
            opp_score: Some(0),
            ..StatEvent::default()
        }
    }

    fn controller() -> PlayerController<RecordingMedia> {
        let mut player = PlayerController::new(RecordingMedia::new(), PlaybackConfig::default());
        player.load_log(&[
            ev("a", 1, 1, 10.0),
            ev("b", 1, 2, 30.0),
            ev("c", 2, 1, 60.0),
            ev("d", 2, 2, 80.0),
        ]);
        player
    }

    #[test]
    fn manual_seek_cancels_highlights() {
        let mut player = controller();
        assert!(player.play_windows(vec![Window { start: 5.0, end: 8.0 }]));
        assert!(player.is_sequencing());

        player.seek(50.0);
        assert!(!player.is_sequencing());
        let calls_before = player.media().calls.len();
        player.media_mut().set_time(100.0);
        player.on_time_update(Instant::now());
        assert_eq!(player.media().calls.len(), calls_before);
    }

    #[test]
    fn previous_set_near_start_goes_back_a_set() {
        let mut player = controller();
        let now = Instant::now();
        assert!(player.seek_to_set(2, now));
        assert_eq!(player.media().current_time(), 59.0);

        player.previous_set(now);
        assert_eq!(player.media().current_time(), 9.0);
        assert_eq!(player.status().current_set, 1);

        player.media_mut().set_time(40.0);
        player.previous_set(now);
        assert_eq!(player.media().current_time(), 9.0);
    }

    #[test]
    fn rally_navigation_and_jumps() {
        let mut player = controller();
        player.media_mut().set_time(30.0);
        assert_eq!(player.previous_rally(), Some(9.0));
        assert_eq!(player.next_rally(), Some(29.0));
        player.jump_to_time(60.0);
        assert_eq!(player.media().current_time(), 59.0);
        assert_eq!(
            player.media().calls.last(),
            Some(&MediaCall::Seek(59.0))
        );
    }

    #[test]
    fn stopping_highlights_pauses_in_place() {
        let mut player = controller();
        player.play_windows(vec![Window { start: 5.0, end: 8.0 }]);
        player.media_mut().set_time(6.5);

        assert!(player.stop_highlights());
        assert!(!player.is_sequencing());
        assert!(player.media().is_paused());
        assert_eq!(player.media().current_time(), 6.5);
        assert_eq!(
            player.media().calls,
            vec![MediaCall::Seek(5.0), MediaCall::Play, MediaCall::Pause]
        );

        // Nothing running: no extra pause.
        assert!(!player.stop_highlights());
        assert_eq!(player.media().calls.len(), 3);
    }

    #[test]
    fn rejected_seek_leaves_the_playhead() {
        let mut player = controller();
        player.media_mut().set_time(30.0);
        player.media_mut().reject_seek_at = Some(0);
        assert_eq!(player.next_rally(), None);
        assert_eq!(player.media().current_time(), 30.0);
        assert_eq!(player.next_rally(), Some(59.0));
    }
}
