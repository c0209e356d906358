use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Button, JujubeError, MusicTime, Result};

/// A single scored event: which panel, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub position: Button,
    #[serde(rename = "time")]
    pub timing: MusicTime,
}

impl Note {
    pub fn new(position: Button, timing: MusicTime) -> Self {
        Self { position, timing }
    }
}

/// Time interval covered by a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBounds {
    pub start: MusicTime,
    pub end: MusicTime,
}

impl TimeBounds {
    pub fn duration(&self) -> MusicTime {
        self.end - self.start
    }
}

/// Chart data as authored. Notes keep their authoring order here; the
/// gameplay timeline sorts them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub level: u32,
    pub notes: Vec<Note>,
}

impl Chart {
    pub fn new(level: u32, notes: Vec<Note>) -> Self {
        Self { level, notes }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let chart: Chart = serde_json::from_str(&contents).map_err(|err| {
            JujubeError::InvalidChart(format!("{}: {err}", path.display()))
        })?;
        Ok(chart)
    }

    /// Time of the very last scorable event, if the chart has any notes.
    pub fn last_event_timing(&self) -> Option<MusicTime> {
        self.notes.iter().map(|note| note.timing).max()
    }

    /// Interval covered by the notes, always including offset zero.
    pub fn time_bounds(&self) -> TimeBounds {
        self.notes.iter().fold(
            TimeBounds {
                start: MusicTime::ZERO,
                end: MusicTime::ZERO,
            },
            |bounds, note| TimeBounds {
                start: bounds.start.min(note.timing),
                end: bounds.end.max(note.timing),
            },
        )
    }
}
