use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::ClockStatus;
use crate::{AudioBackend, AudioConfig, AudioStream, MusicTime, PlaybackStatus, Result};

/// Anchor value meaning "no position change observed yet".
const UNTRUSTED: i64 = i64::MIN;

/// Turns a staircase of backend positions into a continuous time line.
///
/// Every time the reported position changes, the lag is re-estimated as
/// half the wall-clock time since the previous change: the real transition
/// happened somewhere inside that interval and the midpoint is the best
/// guess. The result is an anchor such that
/// `music_time = wall_time + anchor`.
#[derive(Debug, Clone)]
pub struct LagEstimator {
    smoothing: f64,
    last_position: Option<MusicTime>,
    last_change: MusicTime,
    lag: Option<MusicTime>,
}

impl LagEstimator {
    /// `smoothing` is the weight of each new lag sample, from 0 (exclusive)
    /// to 1. A value of 1 keeps only the latest half-interval.
    pub fn new(smoothing: f64) -> Self {
        let smoothing = if smoothing.is_finite() {
            smoothing.clamp(f64::EPSILON, 1.0)
        } else {
            1.0
        };
        Self {
            smoothing,
            last_position: None,
            last_change: MusicTime::ZERO,
            lag: None,
        }
    }

    pub fn lag(&self) -> Option<MusicTime> {
        self.lag
    }

    /// Feeds one sample taken while the stream is playing. Returns the new
    /// anchor whenever the backend position moved.
    pub fn observe(&mut self, position: MusicTime, wall: MusicTime) -> Option<MusicTime> {
        let Some(last_position) = self.last_position else {
            self.last_position = Some(position);
            self.last_change = wall;
            return None;
        };
        if position == last_position {
            return None;
        }

        let sample = (wall - self.last_change).half();
        let lag = match self.lag {
            Some(previous) => {
                let blended = previous.as_micros() as f64
                    + self.smoothing * (sample.as_micros() - previous.as_micros()) as f64;
                MusicTime::from_micros(blended.round() as i64)
            }
            None => sample,
        };
        self.lag = Some(lag);
        self.last_position = Some(position);
        self.last_change = wall;
        Some(position - wall - lag)
    }

    /// Forgets the baseline so the next sample starts a fresh measurement.
    /// The lag estimate itself survives pauses.
    pub fn interrupt(&mut self) {
        self.last_position = None;
    }
}

#[derive(Debug)]
struct ClockShared {
    origin: Instant,
    anchor: AtomicI64,
    high_water: AtomicI64,
    stop_watchdog: AtomicBool,
}

impl ClockShared {
    fn wall_now(&self) -> MusicTime {
        MusicTime::from_duration(self.origin.elapsed())
    }
}

/// Music time extrapolated from a streaming track.
///
/// A watchdog thread polls the backend at millisecond granularity and
/// publishes a single atomic anchor; readers never block.
pub struct PlaybackClock {
    stream: Arc<dyn AudioStream>,
    shared: Arc<ClockShared>,
    watchdog: Option<JoinHandle<()>>,
    started: AtomicBool,
}

impl PlaybackClock {
    /// Opens `path` through `backend` and starts measuring it.
    pub fn open(backend: &dyn AudioBackend, path: &Path, config: &AudioConfig) -> Result<Self> {
        let stream = backend.open(path)?;
        Self::new(stream, config)
    }

    pub fn new(stream: Arc<dyn AudioStream>, config: &AudioConfig) -> Result<Self> {
        let shared = Arc::new(ClockShared {
            origin: Instant::now(),
            anchor: AtomicI64::new(UNTRUSTED),
            high_water: AtomicI64::new(i64::MIN),
            stop_watchdog: AtomicBool::new(false),
        });
        let poll = config.watchdog_interval.to_duration().max(Duration::from_micros(100));
        let estimator = LagEstimator::new(config.lag_smoothing);

        let watchdog = {
            let stream = Arc::clone(&stream);
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("clock-watchdog".into())
                .spawn(move || watchdog_main(stream.as_ref(), &shared, poll, estimator))?
        };

        Ok(Self {
            stream,
            shared,
            watchdog: Some(watchdog),
            started: AtomicBool::new(false),
        })
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
        self.stream.play();
    }

    /// Stops the stream. Readings stay at the last extrapolated time.
    pub fn stop(&self) {
        self.current_time();
        self.started.store(true, Ordering::Release);
        self.stream.stop();
    }

    pub fn status(&self) -> ClockStatus {
        match self.stream.status() {
            PlaybackStatus::Playing => ClockStatus::Playing,
            PlaybackStatus::Paused => ClockStatus::Paused,
            PlaybackStatus::Stopped if self.started.load(Ordering::Acquire) => {
                ClockStatus::Finished
            }
            PlaybackStatus::Stopped => ClockStatus::Ready,
        }
    }

    /// Whether a backend position change has been observed since playback
    /// last (re)started.
    pub fn is_trusted(&self) -> bool {
        self.shared.anchor.load(Ordering::Acquire) != UNTRUSTED
    }

    /// Extrapolated music time. Never decreases; frozen while the stream is
    /// not playing.
    pub fn current_time(&self) -> MusicTime {
        let reading = if self.stream.status() == PlaybackStatus::Playing {
            match self.shared.anchor.load(Ordering::Acquire) {
                UNTRUSTED => self.stream.position(),
                anchor => self.shared.wall_now() + MusicTime::from_micros(anchor),
            }
        } else {
            self.stream.position()
        };
        let previous = self
            .shared
            .high_water
            .fetch_max(reading.as_micros(), Ordering::AcqRel);
        reading.max(MusicTime::from_micros(previous))
    }

    /// Stops and joins the watchdog. Called automatically on drop.
    pub fn shutdown(&mut self) {
        self.shared.stop_watchdog.store(true, Ordering::Release);
        if let Some(watchdog) = self.watchdog.take() {
            if let Err(panic) = watchdog.join() {
                std::panic::resume_unwind(panic);
            }
        }
    }
}

impl Drop for PlaybackClock {
    fn drop(&mut self) {
        self.shared.stop_watchdog.store(true, Ordering::Release);
        if let Some(watchdog) = self.watchdog.take() {
            if watchdog.join().is_err() {
                tracing::error!("clock watchdog panicked");
            }
        }
    }
}

impl std::fmt::Debug for PlaybackClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackClock")
            .field("trusted", &self.is_trusted())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

fn watchdog_main(
    stream: &dyn AudioStream,
    shared: &ClockShared,
    poll: Duration,
    mut estimator: LagEstimator,
) {
    while !shared.stop_watchdog.load(Ordering::Acquire) {
        if stream.status() == PlaybackStatus::Playing {
            let wall = shared.wall_now();
            if let Some(anchor) = estimator.observe(stream.position(), wall) {
                shared.anchor.store(anchor.as_micros(), Ordering::Release);
                tracing::trace!(lag = ?estimator.lag(), "backend position moved");
            }
        } else {
            estimator.interrupt();
            shared.anchor.store(UNTRUSTED, Ordering::Release);
        }
        thread::sleep(poll);
    }
    tracing::debug!(lag = ?estimator.lag(), "clock watchdog stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedStream;

    fn ms(value: i64) -> MusicTime {
        MusicTime::from_millis(value)
    }

    #[test]
    fn lag_is_half_the_interval_between_changes() {
        let mut estimator = LagEstimator::new(1.0);
        assert_eq!(estimator.observe(ms(0), ms(0)), None);
        assert_eq!(estimator.observe(ms(0), ms(60)), None);

        let anchor = estimator.observe(ms(20), ms(100)).unwrap();
        assert_eq!(estimator.lag(), Some(ms(50)));
        // 20ms position + 30ms since detection - 50ms lag
        assert_eq!(ms(130) + anchor, ms(0));
    }

    #[test]
    fn smoothing_blends_successive_samples() {
        let mut estimator = LagEstimator::new(0.5);
        estimator.observe(ms(0), ms(0));
        estimator.observe(ms(20), ms(20));
        assert_eq!(estimator.lag(), Some(ms(10)));

        estimator.observe(ms(40), ms(60));
        assert_eq!(estimator.lag(), Some(ms(15)));
    }

    #[test]
    fn extrapolation_tracks_a_centered_staircase() {
        let buffer = 20;
        let reported = |truth: i64| (truth + buffer / 2) / buffer * buffer;
        let mut estimator = LagEstimator::new(1.0);
        let mut anchor = None;

        for wall in 0..1_000 {
            if let Some(next) = estimator.observe(ms(reported(wall)), ms(wall)) {
                anchor = Some(next);
            }
            if wall >= 30 {
                let extrapolated = ms(wall) + anchor.unwrap();
                let error = (extrapolated - ms(wall)).abs();
                assert!(error <= ms(1), "error {error} at {wall}ms");
            }
        }
    }

    #[test]
    fn interruptions_restart_the_baseline() {
        let mut estimator = LagEstimator::new(1.0);
        estimator.observe(ms(0), ms(0));
        estimator.observe(ms(20), ms(20));
        estimator.interrupt();

        assert_eq!(estimator.observe(ms(40), ms(500)), None);
        assert_eq!(estimator.lag(), Some(ms(10)));
        assert!(estimator.observe(ms(60), ms(520)).is_some());
    }

    #[test]
    fn playing_clock_follows_the_stream() {
        let stream = Arc::new(SimulatedStream::new(
            Duration::from_secs(5),
            Duration::from_millis(20),
        ));
        let clock = PlaybackClock::new(stream.clone(), &AudioConfig::default()).unwrap();
        assert_eq!(clock.status(), ClockStatus::Ready);

        clock.start();
        thread::sleep(Duration::from_millis(250));
        assert!(clock.is_trusted());

        let mut last = MusicTime::MIN;
        for _ in 0..50 {
            let reading = clock.current_time();
            let truth = stream.true_position();
            assert!(reading >= last);
            assert!((reading - truth).abs() <= ms(15), "{reading} vs {truth}");
            last = reading;
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn paused_clock_is_frozen_and_resumes_forward() {
        let stream = Arc::new(SimulatedStream::new(
            Duration::from_secs(5),
            Duration::from_millis(20),
        ));
        let clock = PlaybackClock::new(stream.clone(), &AudioConfig::default()).unwrap();
        clock.start();
        thread::sleep(Duration::from_millis(200));
        let before_pause = clock.current_time();

        stream.pause();
        let paused = clock.current_time();
        assert!(paused >= before_pause);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(clock.current_time(), paused);
        assert_eq!(clock.status(), ClockStatus::Paused);

        stream.play();
        let mut last = paused;
        for _ in 0..50 {
            let reading = clock.current_time();
            assert!(reading >= last, "{reading} went back from {last}");
            last = reading;
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(clock.status(), ClockStatus::Playing);
        assert!(last > paused);
    }

    #[test]
    fn stopped_clock_is_frozen_and_finished() {
        let stream = Arc::new(SimulatedStream::new(
            Duration::from_secs(5),
            Duration::from_millis(20),
        ));
        let mut clock = PlaybackClock::new(stream, &AudioConfig::default()).unwrap();
        clock.start();
        thread::sleep(Duration::from_millis(60));
        clock.stop();

        let frozen = clock.current_time();
        assert!(frozen > MusicTime::ZERO);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(clock.current_time(), frozen);
        assert_eq!(clock.status(), ClockStatus::Finished);

        clock.shutdown();
        clock.shutdown();
    }
}
