//! Time sources.
//!
//! A session reads music time from exactly one [`TimeSource`], chosen when
//! the session is built: a [`PlaybackClock`] when the chart has audio, a
//! [`SilentClock`] otherwise.

mod playback;
mod silent;

pub use playback::{LagEstimator, PlaybackClock};
pub use silent::SilentClock;

use crate::MusicTime;

/// Lifecycle of a time source as seen by the gameplay loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStatus {
    /// Built but not started yet.
    Ready,
    Playing,
    Paused,
    /// The track (or the silent duration) ran out, or the clock was stopped.
    Finished,
}

#[derive(Debug)]
pub enum TimeSource {
    Playback(PlaybackClock),
    Silent(SilentClock),
}

impl TimeSource {
    pub fn current_time(&self) -> MusicTime {
        match self {
            TimeSource::Playback(clock) => clock.current_time(),
            TimeSource::Silent(clock) => clock.current_time(),
        }
    }

    pub fn status(&self) -> ClockStatus {
        match self {
            TimeSource::Playback(clock) => clock.status(),
            TimeSource::Silent(clock) => clock.status(),
        }
    }

    pub fn start(&self) {
        match self {
            TimeSource::Playback(clock) => clock.start(),
            TimeSource::Silent(clock) => clock.start(),
        }
    }

    pub fn stop(&self) {
        match self {
            TimeSource::Playback(clock) => clock.stop(),
            TimeSource::Silent(clock) => clock.stop(),
        }
    }

    pub fn is_silent(&self) -> bool {
        matches!(self, TimeSource::Silent(_))
    }
}

impl From<PlaybackClock> for TimeSource {
    fn from(clock: PlaybackClock) -> Self {
        TimeSource::Playback(clock)
    }
}

impl From<SilentClock> for TimeSource {
    fn from(clock: SilentClock) -> Self {
        TimeSource::Silent(clock)
    }
}
