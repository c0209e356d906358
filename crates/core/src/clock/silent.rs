use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use super::ClockStatus;
use crate::MusicTime;

const RUNNING: i64 = i64::MIN;

/// Timer-only time source for charts without a track.
#[derive(Debug)]
pub struct SilentClock {
    duration: MusicTime,
    started_at: OnceLock<Instant>,
    stopped_at: AtomicI64,
}

impl SilentClock {
    pub fn new(duration: MusicTime) -> Self {
        Self {
            duration: duration.max(MusicTime::ZERO),
            started_at: OnceLock::new(),
            stopped_at: AtomicI64::new(RUNNING),
        }
    }

    /// Starts the timer. Later calls have no effect.
    pub fn start(&self) {
        self.started_at.get_or_init(Instant::now);
    }

    /// Freezes the clock at its current reading.
    pub fn stop(&self) {
        let now = self.elapsed().as_micros();
        let _ = self
            .stopped_at
            .compare_exchange(RUNNING, now, Ordering::AcqRel, Ordering::Acquire);
    }

    pub fn current_time(&self) -> MusicTime {
        match self.stopped_at.load(Ordering::Acquire) {
            RUNNING => self.elapsed(),
            frozen => MusicTime::from_micros(frozen),
        }
    }

    pub fn status(&self) -> ClockStatus {
        if self.started_at.get().is_none() {
            ClockStatus::Ready
        } else if self.stopped_at.load(Ordering::Acquire) != RUNNING
            || self.elapsed() >= self.duration
        {
            ClockStatus::Finished
        } else {
            ClockStatus::Playing
        }
    }

    fn elapsed(&self) -> MusicTime {
        self.started_at
            .get()
            .map(|start| MusicTime::from_duration(start.elapsed()).min(self.duration))
            .unwrap_or(MusicTime::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn stays_at_zero_until_started() {
        let clock = SilentClock::new(MusicTime::from_millis(100));
        thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.status(), ClockStatus::Ready);
        assert_eq!(clock.current_time(), MusicTime::ZERO);
    }

    #[test]
    fn finishes_after_its_duration() {
        let clock = SilentClock::new(MusicTime::from_millis(20));
        clock.start();
        assert_eq!(clock.status(), ClockStatus::Playing);

        thread::sleep(Duration::from_millis(40));
        assert_eq!(clock.status(), ClockStatus::Finished);
        assert_eq!(clock.current_time(), MusicTime::from_millis(20));
    }

    #[test]
    fn stopping_freezes_the_reading() {
        let clock = SilentClock::new(MusicTime::from_millis(10_000));
        clock.start();
        thread::sleep(Duration::from_millis(5));
        clock.stop();
        let frozen = clock.current_time();
        thread::sleep(Duration::from_millis(5));

        assert_eq!(clock.current_time(), frozen);
        assert_eq!(clock.status(), ClockStatus::Finished);
    }

    #[test]
    fn readings_never_decrease() {
        let clock = SilentClock::new(MusicTime::from_millis(10_000));
        clock.start();
        let mut last = MusicTime::ZERO;
        for _ in 0..1_000 {
            let now = clock.current_time();
            assert!(now >= last);
            last = now;
        }
    }
}
