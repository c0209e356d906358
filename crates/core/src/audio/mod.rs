use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::{JujubeError, MusicTime, Result};

/// Status as reported by the audio backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Paused,
    Playing,
}

/// A streaming track owned by the audio backend.
///
/// `position` is coarse: real mixers only move it when they refill their
/// internal buffer, so consecutive reads return the same value for several
/// milliseconds and then jump.
pub trait AudioStream: Send + Sync {
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    fn position(&self) -> MusicTime;
    fn status(&self) -> PlaybackStatus;
}

/// Opens streams. Failing to open a resource is reported as
/// [`JujubeError::MediaOpen`] and never retried.
pub trait AudioBackend {
    fn open(&self, path: &Path) -> Result<Arc<dyn AudioStream>>;
}

/// Backend producing [`SimulatedStream`]s of a fixed length.
///
/// Decoding is out of scope for this crate, so the simulated backend only
/// checks that the file can be opened and then plays silence for `duration`.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    pub duration: Duration,
    pub buffer: Duration,
}

impl SimulatedBackend {
    pub fn new(duration: Duration, buffer: Duration) -> Self {
        Self { duration, buffer }
    }
}

impl AudioBackend for SimulatedBackend {
    fn open(&self, path: &Path) -> Result<Arc<dyn AudioStream>> {
        std::fs::File::open(path).map_err(|err| JujubeError::media_open(path, err))?;
        tracing::debug!(path = %path.display(), "opened simulated audio stream");
        Ok(Arc::new(SimulatedStream::new(self.duration, self.buffer)))
    }
}

#[derive(Debug)]
struct StreamState {
    status: PlaybackStatus,
    played: Duration,
    resumed_at: Option<Instant>,
}

impl StreamState {
    fn elapsed(&self, now: Instant) -> Duration {
        self.played
            + self
                .resumed_at
                .map(|resumed| now.saturating_duration_since(resumed))
                .unwrap_or_default()
    }
}

/// Wall-clock driven stream whose reported position advances in
/// buffer-sized jumps, the way a mixer only publishes its position when it
/// refills a buffer.
#[derive(Debug)]
pub struct SimulatedStream {
    duration: Duration,
    buffer: Duration,
    state: Mutex<StreamState>,
}

impl SimulatedStream {
    pub fn new(duration: Duration, buffer: Duration) -> Self {
        Self {
            duration,
            buffer: buffer.max(Duration::from_micros(1)),
            state: Mutex::new(StreamState {
                status: PlaybackStatus::Stopped,
                played: Duration::ZERO,
                resumed_at: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current status and unquantised play time, ending the stream once the
    /// play time reaches its duration.
    fn refresh(&self) -> (PlaybackStatus, Duration) {
        let mut state = self.lock();
        let now = Instant::now();
        let elapsed = state.elapsed(now).min(self.duration);
        if state.status == PlaybackStatus::Playing && elapsed >= self.duration {
            state.status = PlaybackStatus::Stopped;
            state.played = self.duration;
            state.resumed_at = None;
        }
        (state.status, elapsed)
    }

    /// Rounds to the nearest buffer boundary, so the reported position runs
    /// up to half a buffer ahead of or behind the true one.
    fn quantise(&self, elapsed: Duration) -> Duration {
        let buffer = self.buffer.as_nanos();
        let steps = (elapsed.as_nanos() + buffer / 2) / buffer;
        Duration::from_nanos(u64::try_from(steps * buffer).unwrap_or(u64::MAX)).min(self.duration)
    }

    /// Unquantised play time, the ground truth the coarse position hides.
    pub fn true_position(&self) -> MusicTime {
        MusicTime::from_duration(self.refresh().1)
    }
}

impl AudioStream for SimulatedStream {
    fn play(&self) {
        let mut state = self.lock();
        if state.status != PlaybackStatus::Playing {
            if state.played >= self.duration {
                state.played = Duration::ZERO;
            }
            state.status = PlaybackStatus::Playing;
            state.resumed_at = Some(Instant::now());
        }
    }

    fn pause(&self) {
        let mut state = self.lock();
        if state.status == PlaybackStatus::Playing {
            state.played = state.elapsed(Instant::now()).min(self.duration);
            state.status = PlaybackStatus::Paused;
            state.resumed_at = None;
        }
    }

    fn stop(&self) {
        let mut state = self.lock();
        state.status = PlaybackStatus::Stopped;
        state.played = Duration::ZERO;
        state.resumed_at = None;
    }

    fn position(&self) -> MusicTime {
        let (status, elapsed) = self.refresh();
        if status == PlaybackStatus::Stopped && elapsed < self.duration {
            return MusicTime::ZERO;
        }
        MusicTime::from_duration(self.quantise(elapsed))
    }

    fn status(&self) -> PlaybackStatus {
        self.refresh().0
    }
}
