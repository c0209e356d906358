use serde::{Deserialize, Serialize};

use crate::{Button, JujubeError, MusicTime, Result};

/// Accuracy grades, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Judgment {
    Perfect,
    Great,
    Good,
    Poor,
    Miss,
}

impl Judgment {
    pub const ALL: [Judgment; 5] = [
        Judgment::Perfect,
        Judgment::Great,
        Judgment::Good,
        Judgment::Poor,
        Judgment::Miss,
    ];

    fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.get(usize::from(bits)).copied()
    }

    fn to_bits(self) -> u8 {
        self as u8
    }
}

/// Outcome recorded on a note once it has been judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgmentResult {
    /// Music time of the press minus the note's target time.
    pub error: MusicTime,
    pub judgment: Judgment,
}

impl JudgmentResult {
    pub fn new(error: MusicTime, judgment: Judgment) -> Self {
        Self { error, judgment }
    }

    /// The value written by the miss sweep.
    pub fn miss() -> Self {
        Self::new(MusicTime::ZERO, Judgment::Miss)
    }
}

const RESOLVED_BIT: u64 = 1 << 63;
const TIER_SHIFT: u32 = 32;

/// Packs a result into a single word so a note slot can be swapped with one
/// compare-and-set. Zero is reserved for "unresolved".
///
/// Layout: bit 63 is the resolved flag, bits 32..40 hold the tier and the
/// low 32 bits hold the error in microseconds as an `i32`, saturated.
pub(crate) fn pack(result: JudgmentResult) -> u64 {
    let micros = result
        .error
        .as_micros()
        .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    RESOLVED_BIT | (u64::from(result.judgment.to_bits()) << TIER_SHIFT) | u64::from(micros as u32)
}

pub(crate) fn unpack(bits: u64) -> Option<JudgmentResult> {
    if bits & RESOLVED_BIT == 0 {
        return None;
    }
    let judgment = Judgment::from_bits(((bits >> TIER_SHIFT) & 0xff) as u8)?;
    let error = MusicTime::from_micros(i64::from(bits as u32 as i32));
    Some(JudgmentResult { error, judgment })
}

/// Tier boundaries and the windows derived from them.
///
/// Every boundary is an inclusive bound on the absolute timing error. The
/// `poor` boundary doubles as the hit window: presses further away than that
/// never resolve a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingWindows {
    pub perfect: MusicTime,
    pub great: MusicTime,
    pub good: MusicTime,
    pub poor: MusicTime,
    /// How long an unresolved note may linger past its target time before
    /// the cursor sweep marks it missed.
    pub miss: MusicTime,
}

impl Default for TimingWindows {
    fn default() -> Self {
        Self {
            perfect: MusicTime::from_millis(42),
            great: MusicTime::from_millis(84),
            good: MusicTime::from_millis(126),
            poor: MusicTime::from_millis(168),
            miss: MusicTime::from_micros(533_333),
        }
    }
}

impl TimingWindows {
    pub fn hit_window(&self) -> MusicTime {
        self.poor
    }

    pub fn miss_window(&self) -> MusicTime {
        self.miss
    }

    fn table(&self) -> [(Judgment, MusicTime); 4] {
        [
            (Judgment::Perfect, self.perfect),
            (Judgment::Great, self.great),
            (Judgment::Good, self.good),
            (Judgment::Poor, self.poor),
        ]
    }

    /// Returns the tightest tier whose boundary contains `error`, or `None`
    /// when the error falls outside the hit window.
    pub fn classify(&self, error: MusicTime) -> Option<Judgment> {
        let distance = error.abs();
        self.table()
            .into_iter()
            .find(|(_, bound)| distance <= *bound)
            .map(|(judgment, _)| judgment)
    }

    pub fn validate(&self) -> Result<()> {
        let table = self.table();
        if table[0].1 < MusicTime::ZERO {
            return Err(JujubeError::InvalidConfig(
                "timing windows must not be negative".into(),
            ));
        }
        for pair in table.windows(2) {
            if pair[1].1 <= pair[0].1 {
                return Err(JujubeError::InvalidConfig(format!(
                    "{:?} window ({}) must be wider than the {:?} window ({})",
                    pair[1].0, pair[1].1, pair[0].0, pair[0].1
                )));
            }
        }
        if self.miss < self.poor {
            return Err(JujubeError::InvalidConfig(format!(
                "miss window ({}) is narrower than the hit window ({})",
                self.miss, self.poor
            )));
        }
        Ok(())
    }
}

/// A note transitioning from unresolved to resolved. Exactly one event is
/// published per note per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JudgmentEvent {
    pub index: usize,
    pub position: Button,
    pub timing: MusicTime,
    pub result: JudgmentResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: i64) -> MusicTime {
        MusicTime::from_millis(value)
    }

    #[test]
    fn packed_results_survive_the_atomic_word() {
        let result = JudgmentResult::new(ms(-10), Judgment::Great);
        assert_eq!(unpack(pack(result)), Some(result));
        assert_ne!(pack(JudgmentResult::miss()), 0);
        assert_eq!(unpack(0), None);
    }

    #[test]
    fn errors_beyond_the_packed_range_saturate() {
        let huge = JudgmentResult::new(MusicTime::from_micros(i64::MAX), Judgment::Miss);
        let restored = unpack(pack(huge)).unwrap();
        assert_eq!(restored.error, MusicTime::from_micros(i64::from(i32::MAX)));
    }

    #[test]
    fn classifies_by_absolute_error() {
        let windows = TimingWindows::default();
        assert_eq!(windows.classify(ms(0)), Some(Judgment::Perfect));
        assert_eq!(windows.classify(ms(-42)), Some(Judgment::Perfect));
        assert_eq!(windows.classify(ms(43)), Some(Judgment::Great));
        assert_eq!(windows.classify(ms(-100)), Some(Judgment::Good));
        assert_eq!(windows.classify(ms(150)), Some(Judgment::Poor));
        assert_eq!(windows.classify(ms(169)), None);
    }

    #[test]
    fn rejects_unordered_windows() {
        let mut windows = TimingWindows::default();
        assert!(windows.validate().is_ok());

        windows.great = windows.perfect;
        assert!(windows.validate().is_err());

        let mut windows = TimingWindows::default();
        windows.miss = ms(10);
        let err = windows.validate().unwrap_err();
        assert!(format!("{err}").contains("miss window"));
    }
}
