//! Fixed note sequence with write-once judgment slots.
//!
//! Every slot starts unresolved and is resolved by a single successful
//! compare-and-set, whichever thread gets there first. The judgment cursor
//! only ever grows; everything before it is settled.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::judgment::{pack, unpack};
use crate::{Button, JudgmentResult, MusicTime, Note, TimingWindows};

const UNRESOLVED: u64 = 0;

/// A note paired with its (eventual) judgment.
#[derive(Debug)]
pub struct NoteSlot {
    note: Note,
    judgment: AtomicU64,
}

impl NoteSlot {
    pub fn new(note: Note) -> Self {
        Self {
            note,
            judgment: AtomicU64::new(UNRESOLVED),
        }
    }

    pub fn note(&self) -> &Note {
        &self.note
    }

    pub fn timing(&self) -> MusicTime {
        self.note.timing
    }

    pub fn position(&self) -> Button {
        self.note.position
    }

    pub fn judgment(&self) -> Option<JudgmentResult> {
        unpack(self.judgment.load(Ordering::Acquire))
    }

    pub fn is_resolved(&self) -> bool {
        self.judgment().is_some()
    }

    /// Resolves the slot if nobody has yet. On failure the value that won is
    /// returned instead.
    pub fn try_resolve(&self, result: JudgmentResult) -> Result<JudgmentResult, JudgmentResult> {
        match self.judgment.compare_exchange(
            UNRESOLVED,
            pack(result),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(result),
            Err(current) => Err(unpack(current).unwrap_or(result)),
        }
    }
}

/// What a press did to the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// The press resolved the note at `index`.
    Judged { index: usize, result: JudgmentResult },
    /// The press targeted the note at `index` but a concurrent miss sweep
    /// resolved it first. Counts as a miss for the press; nothing is written.
    Contested { index: usize, existing: JudgmentResult },
    /// No pending note of that position was inside the hit window.
    Ghost,
}

/// The session's notes, sorted by target time and never resized.
#[derive(Debug)]
pub struct NoteTimeline {
    slots: Box<[NoteSlot]>,
    cursor: AtomicUsize,
}

impl NoteTimeline {
    /// Builds the timeline. Notes are ordered by target time; notes with
    /// identical timings keep their authoring order.
    pub fn new(notes: impl IntoIterator<Item = Note>) -> Self {
        let mut notes: Vec<Note> = notes.into_iter().collect();
        notes.sort_by_key(|note| note.timing);
        Self {
            slots: notes.into_iter().map(NoteSlot::new).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[NoteSlot] {
        &self.slots
    }

    pub fn get(&self, index: usize) -> Option<&NoteSlot> {
        self.slots.get(index)
    }

    /// Index of the first slot not known to be resolved.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Index of the first slot whose target time is not before `time`.
    pub fn lower_bound(&self, time: MusicTime) -> usize {
        self.slots.partition_point(|slot| slot.timing() < time)
    }

    /// Marks every unresolved note older than `music_time - miss_window` as
    /// missed and moves the cursor past the settled prefix.
    pub fn advance_cursor(&self, music_time: MusicTime, miss_window: MusicTime) -> usize {
        self.advance_cursor_with(music_time, miss_window, |_, _, _| {})
    }

    /// Same as [`advance_cursor`](Self::advance_cursor), reporting every
    /// miss this call wrote. Misses written by other threads are not reported.
    pub fn advance_cursor_with(
        &self,
        music_time: MusicTime,
        miss_window: MusicTime,
        mut on_miss: impl FnMut(usize, &Note, JudgmentResult),
    ) -> usize {
        let deadline = music_time - miss_window;
        let mut index = self.cursor();
        while let Some(slot) = self.slots.get(index) {
            if !slot.is_resolved() {
                if slot.timing() >= deadline {
                    break;
                }
                if let Ok(result) = slot.try_resolve(JudgmentResult::miss()) {
                    on_miss(index, slot.note(), result);
                }
            }
            index += 1;
        }
        self.publish_cursor(index)
    }

    /// Resolves the earliest pending note at `position` whose target time lies
    /// within `hit_window` of `music_time`. Later notes are never considered
    /// once a candidate's target time passes `music_time + hit_window`.
    pub fn resolve_hit(
        &self,
        position: Button,
        music_time: MusicTime,
        windows: &TimingWindows,
    ) -> HitOutcome {
        let hit_window = windows.hit_window();
        let earliest = music_time - hit_window;
        let latest = music_time + hit_window;

        let start = self.cursor();
        for (index, slot) in self.slots.iter().enumerate().skip(start) {
            if slot.timing() > latest {
                break;
            }
            if slot.position() != position || slot.timing() < earliest || slot.is_resolved() {
                continue;
            }

            let error = music_time - slot.timing();
            let Some(judgment) = windows.classify(error) else {
                continue;
            };
            return match slot.try_resolve(JudgmentResult::new(error, judgment)) {
                Ok(result) => HitOutcome::Judged { index, result },
                Err(existing) => HitOutcome::Contested { index, existing },
            };
        }
        HitOutcome::Ghost
    }

    /// True if some slot at or after the cursor is unresolved and due no
    /// later than `until`.
    pub fn has_pending_until(&self, until: MusicTime) -> bool {
        self.slots[self.cursor()..]
            .iter()
            .take_while(|slot| slot.timing() <= until)
            .any(|slot| !slot.is_resolved())
    }

    /// Resolves every remaining slot as a miss and moves the cursor to the end.
    pub fn resolve_remaining(&self, mut on_miss: impl FnMut(usize, &Note, JudgmentResult)) {
        for (index, slot) in self.slots.iter().enumerate().skip(self.cursor()) {
            if let Ok(result) = slot.try_resolve(JudgmentResult::miss()) {
                on_miss(index, slot.note(), result);
            }
        }
        self.publish_cursor(self.slots.len());
    }

    pub fn is_settled(&self) -> bool {
        self.slots.iter().all(NoteSlot::is_resolved)
    }

    fn publish_cursor(&self, candidate: usize) -> usize {
        let previous = self.cursor.fetch_max(candidate, Ordering::AcqRel);
        previous.max(candidate)
    }
}
