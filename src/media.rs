use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("playback was rejected: {0}")]
    PlayRejected(String),
    #[error("seek was rejected: {0}")]
    SeekRejected(String),
}

/// The slice of a video element the review engine drives.
pub trait MediaElement {
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    fn is_paused(&self) -> bool;
    fn seek(&mut self, time: f64) -> Result<(), MediaError>;
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self);
}

/// A clock-driven stand-in for a video element. Time only moves on `advance`.
#[derive(Debug, Clone)]
pub struct SimulatedMedia {
    position: f64,
    duration: f64,
    paused: bool,
    rate: f64,
}

impl SimulatedMedia {
    pub fn new(duration: f64) -> Self {
        Self {
            position: 0.0,
            duration: duration.max(0.0),
            paused: true,
            rate: 1.0,
        }
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate.clamp(0.25, 4.0);
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Stretch or shrink the clip; the playhead is kept inside it.
    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration.max(0.0);
        self.position = self.position.min(self.duration);
    }

    pub fn advance(&mut self, elapsed: Duration) {
        if self.paused {
            return;
        }
        self.position = (self.position + elapsed.as_secs_f64() * self.rate).min(self.duration);
        if self.position >= self.duration {
            self.paused = true;
        }
    }
}

impl MediaElement for SimulatedMedia {
    fn current_time(&self) -> f64 {
        self.position
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn seek(&mut self, time: f64) -> Result<(), MediaError> {
        if !time.is_finite() {
            return Err(MediaError::SeekRejected(format!("non-finite time {time}")));
        }
        self.position = time.clamp(0.0, self.duration);
        Ok(())
    }

    fn play(&mut self) -> Result<(), MediaError> {
        if self.position >= self.duration {
            return Err(MediaError::PlayRejected("at end of media".to_string()));
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }
}

pub mod recording {
    use super::{MediaElement, MediaError};

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum MediaCall {
        Seek(f64),
        Play,
        Pause,
    }

    /// Records every call in order. Time is set by the test, never by playback.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingMedia {
        pub calls: Vec<MediaCall>,
        pub time: f64,
        pub paused: bool,
        pub reject_play: bool,
        /// Reject only the nth play call (0-based), if set.
        pub reject_play_at: Option<usize>,
        /// Reject only the nth seek call (0-based), if set.
        pub reject_seek_at: Option<usize>,
        plays: usize,
        seeks: usize,
    }

    impl RecordingMedia {
        pub fn new() -> Self {
            Self {
                paused: true,
                ..Self::default()
            }
        }

        pub fn set_time(&mut self, t: f64) {
            self.time = t;
        }

        pub fn seeks(&self) -> Vec<f64> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    MediaCall::Seek(t) => Some(*t),
                    _ => None,
                })
                .collect()
        }
    }

    impl MediaElement for RecordingMedia {
        fn current_time(&self) -> f64 {
            self.time
        }

        fn duration(&self) -> f64 {
            f64::MAX
        }

        fn is_paused(&self) -> bool {
            self.paused
        }

        fn seek(&mut self, time: f64) -> Result<(), MediaError> {
            self.calls.push(MediaCall::Seek(time));
            let nth = self.seeks;
            self.seeks += 1;
            if self.reject_seek_at == Some(nth) {
                return Err(MediaError::SeekRejected("range not buffered".to_string()));
            }
            self.time = time;
            Ok(())
        }

        fn play(&mut self) -> Result<(), MediaError> {
            self.calls.push(MediaCall::Play);
            let nth = self.plays;
            self.plays += 1;
            if self.reject_play || self.reject_play_at == Some(nth) {
                return Err(MediaError::PlayRejected("autoplay blocked".to_string()));
            }
            self.paused = false;
            Ok(())
        }

        fn pause(&mut self) {
            self.calls.push(MediaCall::Pause);
            self.paused = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_media_only_moves_while_playing() {
        let mut media = SimulatedMedia::new(30.0);
        media.advance(Duration::from_secs(5));
        assert_eq!(media.current_time(), 0.0);

        media.play().unwrap();
        media.advance(Duration::from_millis(1500));
        assert!((media.current_time() - 1.5).abs() < 1e-9);

        media.seek(29.5).unwrap();
        media.advance(Duration::from_secs(2));
        assert_eq!(media.current_time(), 30.0);
        assert!(media.is_paused());
        assert!(media.play().is_err());
        assert!(matches!(
            media.seek(f64::NAN),
            Err(MediaError::SeekRejected(_))
        ));
        assert_eq!(media.current_time(), 30.0);
    }
}
