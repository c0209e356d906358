use serde::{Deserialize, Serialize};

use crate::{Judgment, JudgmentEvent, MusicTime};

/// Final tally handed back when a session ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub perfect: usize,
    pub great: usize,
    pub good: usize,
    pub poor: usize,
    pub miss: usize,
    /// Number of notes in the chart.
    pub total_notes: usize,
    /// Mean signed error over every non-miss judgment.
    pub mean_error: Option<MusicTime>,
    /// Judgment of each note, in timeline order.
    pub judgments: Vec<Option<Judgment>>,
}

impl ScoreSnapshot {
    pub fn count(&self, judgment: Judgment) -> usize {
        match judgment {
            Judgment::Perfect => self.perfect,
            Judgment::Great => self.great,
            Judgment::Good => self.good,
            Judgment::Poor => self.poor,
            Judgment::Miss => self.miss,
        }
    }

    pub fn judged(&self) -> usize {
        Judgment::ALL.iter().map(|judgment| self.count(*judgment)).sum()
    }
}

/// Consumes the judgment event stream. Lives on the render side.
#[derive(Debug, Clone)]
pub struct ScoreTally {
    snapshot: ScoreSnapshot,
    error_sum: i128,
    error_count: usize,
}

impl ScoreTally {
    pub fn new(total_notes: usize) -> Self {
        Self {
            snapshot: ScoreSnapshot {
                total_notes,
                judgments: vec![None; total_notes],
                ..ScoreSnapshot::default()
            },
            error_sum: 0,
            error_count: 0,
        }
    }

    pub fn record(&mut self, event: &JudgmentEvent) {
        let Some(slot) = self.snapshot.judgments.get_mut(event.index) else {
            tracing::warn!(index = event.index, "judgment for a note outside the chart");
            return;
        };
        if slot.is_some() {
            tracing::warn!(index = event.index, "note judged twice, ignoring the second event");
            return;
        }
        *slot = Some(event.result.judgment);

        let counter = match event.result.judgment {
            Judgment::Perfect => &mut self.snapshot.perfect,
            Judgment::Great => &mut self.snapshot.great,
            Judgment::Good => &mut self.snapshot.good,
            Judgment::Poor => &mut self.snapshot.poor,
            Judgment::Miss => &mut self.snapshot.miss,
        };
        *counter += 1;

        if event.result.judgment != Judgment::Miss {
            self.error_sum += i128::from(event.result.error.as_micros());
            self.error_count += 1;
        }
    }

    pub fn snapshot(&self) -> ScoreSnapshot {
        let mut snapshot = self.snapshot.clone();
        snapshot.mean_error = (self.error_count > 0).then(|| {
            MusicTime::from_micros((self.error_sum / self.error_count as i128) as i64)
        });
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Button, JudgmentResult};

    fn event(index: usize, error_ms: i64, judgment: Judgment) -> JudgmentEvent {
        JudgmentEvent {
            index,
            position: Button::new(0).unwrap(),
            timing: MusicTime::ZERO,
            result: JudgmentResult::new(MusicTime::from_millis(error_ms), judgment),
        }
    }

    #[test]
    fn counts_each_tier_and_averages_hit_errors() {
        let mut tally = ScoreTally::new(3);
        tally.record(&event(0, -10, Judgment::Perfect));
        tally.record(&event(1, 30, Judgment::Great));
        tally.record(&event(2, 0, Judgment::Miss));

        let snapshot = tally.snapshot();
        assert_eq!(snapshot.perfect, 1);
        assert_eq!(snapshot.great, 1);
        assert_eq!(snapshot.miss, 1);
        assert_eq!(snapshot.judged(), 3);
        assert_eq!(snapshot.mean_error, Some(MusicTime::from_millis(10)));
    }

    #[test]
    fn ignores_duplicate_and_out_of_range_events() {
        let mut tally = ScoreTally::new(1);
        tally.record(&event(0, 0, Judgment::Good));
        tally.record(&event(0, 0, Judgment::Miss));
        tally.record(&event(5, 0, Judgment::Miss));

        let snapshot = tally.snapshot();
        assert_eq!(snapshot.judged(), 1);
        assert_eq!(snapshot.judgments, vec![Some(Judgment::Good)]);
    }
}
