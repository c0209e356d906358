use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Signed position on the music timeline, stored in microseconds.
///
/// Note timings, judgment windows and timing errors all share this type so
/// that comparisons never mix units. It serializes as floating point
/// milliseconds, which is what charts and preference files use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct MusicTime(i64);

impl MusicTime {
    pub const ZERO: MusicTime = MusicTime(0);
    pub const MAX: MusicTime = MusicTime(i64::MAX);
    pub const MIN: MusicTime = MusicTime(i64::MIN);

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000))
    }

    pub fn from_millis_f64(millis: f64) -> Self {
        if millis.is_finite() {
            Self((millis * 1_000.0).round() as i64)
        } else {
            Self::ZERO
        }
    }

    /// Converts a wall-clock duration, saturating on overflow.
    pub fn from_duration(duration: Duration) -> Self {
        Self(i64::try_from(duration.as_micros()).unwrap_or(i64::MAX))
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// Negative values clamp to zero.
    pub fn to_duration(self) -> Duration {
        Duration::from_micros(self.0.max(0) as u64)
    }

    pub fn max(self, other: Self) -> Self {
        Ord::max(self, other)
    }

    pub fn min(self, other: Self) -> Self {
        Ord::min(self, other)
    }

    /// Halves the value, rounding towards zero.
    pub const fn half(self) -> Self {
        Self(self.0 / 2)
    }
}

impl From<f64> for MusicTime {
    fn from(millis: f64) -> Self {
        Self::from_millis_f64(millis)
    }
}

impl From<MusicTime> for f64 {
    fn from(time: MusicTime) -> Self {
        time.as_millis_f64()
    }
}

impl Add for MusicTime {
    type Output = MusicTime;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for MusicTime {
    type Output = MusicTime;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl AddAssign for MusicTime {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for MusicTime {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for MusicTime {
    type Output = MusicTime;

    fn neg(self) -> Self::Output {
        Self(self.0.saturating_neg())
    }
}

impl fmt::Display for MusicTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.as_millis_f64())
    }
}
