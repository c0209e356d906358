//! Raw input normalisation.
//!
//! Keyboard, controller and pointer events all collapse into a logical
//! [`Button`] press stamped with the music time at which the event was
//! observed. Anything that does not map to a button is dropped here, before
//! it can reach the note timeline.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::{JujubeError, KeyMapping, MusicTime};

pub const GRID_SIZE: u8 = 4;
pub const BUTTON_COUNT: u8 = GRID_SIZE * GRID_SIZE;

/// One of the sixteen panels, numbered row by row from the top left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Button(u8);

impl Button {
    pub fn new(index: u8) -> Option<Self> {
        (index < BUTTON_COUNT).then_some(Self(index))
    }

    pub fn from_coords(x: u8, y: u8) -> Option<Self> {
        if x < GRID_SIZE && y < GRID_SIZE {
            Some(Self(x + GRID_SIZE * y))
        } else {
            None
        }
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Column and row of the panel.
    pub fn coords(self) -> (u8, u8) {
        (self.0 % GRID_SIZE, self.0 / GRID_SIZE)
    }

    pub fn all() -> impl Iterator<Item = Button> {
        (0..BUTTON_COUNT).map(Button)
    }
}

impl TryFrom<u8> for Button {
    type Error = JujubeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Button::new(value).ok_or_else(|| {
            JujubeError::InvalidChart(format!(
                "button index {value} is outside the {BUTTON_COUNT} panel grid"
            ))
        })
    }
}

impl From<Button> for u8 {
    fn from(button: Button) -> Self {
        button.0
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

/// Events produced by the windowing/input backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInput {
    KeyDown(String),
    ControllerButtonDown { controller: u32, button: u32 },
    PointerDown { x: i32, y: i32, button: PointerButton },
    Resized { width: u32, height: u32 },
    Closed,
}

/// Geometry of the 4x4 panel grid in window coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelLayout {
    pub panel_size: f32,
    pub panel_spacing: f32,
    pub ribbon_x: f32,
    pub ribbon_y: f32,
}

impl Default for PanelLayout {
    fn default() -> Self {
        Self {
            panel_size: 160.0,
            panel_spacing: 112.0 / 3.0,
            ribbon_x: 8.0,
            ribbon_y: 602.0,
        }
    }
}

impl PanelLayout {
    /// Side length of the square covering all panels and the gaps between them.
    pub fn area_size(&self) -> i32 {
        let grid = f32::from(GRID_SIZE);
        (self.panel_size * grid + self.panel_spacing * (grid - 1.0)) as i32
    }

    pub fn panel_step(&self) -> f32 {
        self.panel_size + self.panel_spacing
    }

    /// Top left corner of a panel, for presenters.
    pub fn panel_origin(&self, button: Button) -> (f32, f32) {
        let (x, y) = button.coords();
        (
            self.ribbon_x + self.panel_step() * f32::from(x),
            self.ribbon_y + self.panel_step() * f32::from(y),
        )
    }

    /// Maps a pointer position to the panel cell that contains it. Points
    /// outside the panel area, and degenerate layouts, yield `None`.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<Button> {
        let area = i64::from(self.area_size());
        let cell = area / i64::from(GRID_SIZE);
        if cell <= 0 {
            return None;
        }
        let relative_x = i64::from(x) - i64::from(self.ribbon_x as i32);
        let relative_y = i64::from(y) - i64::from(self.ribbon_y as i32);
        if !(0..area).contains(&relative_x) || !(0..area).contains(&relative_y) {
            return None;
        }
        let column = u8::try_from(relative_x / cell).ok()?;
        let row = u8::try_from(relative_y / cell).ok()?;
        Button::from_coords(column, row)
    }
}

/// What a raw event means to the gameplay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Press { button: Button, at: MusicTime },
    Resize { width: u32, height: u32 },
    Close,
}

/// Turns backend events into logical presses.
#[derive(Debug, Clone)]
pub struct InputClassifier {
    mapping: KeyMapping,
    layout: PanelLayout,
}

impl InputClassifier {
    pub fn new(mapping: KeyMapping, layout: PanelLayout) -> Self {
        Self { mapping, layout }
    }

    pub fn layout(&self) -> &PanelLayout {
        &self.layout
    }

    /// Classifies one event. `observed_at` is the music time captured when the
    /// backend handed the event over, not when it is being processed.
    pub fn classify(&self, event: &RawInput, observed_at: MusicTime) -> Option<InputAction> {
        let button = match event {
            RawInput::KeyDown(key) => self.mapping.key_to_button(key),
            RawInput::ControllerButtonDown { controller, button } => {
                self.mapping.controller_to_button(*controller, *button)
            }
            RawInput::PointerDown {
                x,
                y,
                button: PointerButton::Primary,
            } => self.layout.hit_test(*x, *y),
            RawInput::PointerDown { .. } => None,
            RawInput::Resized { width, height } => {
                return Some(InputAction::Resize {
                    width: *width,
                    height: *height,
                })
            }
            RawInput::Closed => return Some(InputAction::Close),
        };
        button.map(|button| InputAction::Press {
            button,
            at: observed_at,
        })
    }
}

/// Windowing/input backend as seen by the update activity.
pub trait InputSource {
    /// Appends every event that arrived since the previous call. `music_time`
    /// is the session's current music time; live backends ignore it.
    fn poll_events(&mut self, music_time: MusicTime, events: &mut Vec<RawInput>);
}

/// Input source that replays pre-timed events, used for autoplay and tests.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    pending: VecDeque<(MusicTime, RawInput)>,
}

impl ScriptedInput {
    pub fn new(events: impl IntoIterator<Item = (MusicTime, RawInput)>) -> Self {
        let mut events: Vec<_> = events.into_iter().collect();
        events.sort_by_key(|(at, _)| *at);
        Self {
            pending: events.into(),
        }
    }

    /// One key press per note, `offset` after the note's target time.
    pub fn autoplay(
        notes: impl IntoIterator<Item = (MusicTime, Button)>,
        mapping: &KeyMapping,
        offset: MusicTime,
    ) -> Self {
        Self::new(notes.into_iter().filter_map(|(timing, button)| {
            let key = mapping.key_for(button)?;
            Some((timing + offset, RawInput::KeyDown(key.to_string())))
        }))
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl InputSource for ScriptedInput {
    fn poll_events(&mut self, music_time: MusicTime, events: &mut Vec<RawInput>) {
        while let Some((at, _)) = self.pending.front() {
            if *at > music_time {
                break;
            }
            if let Some((_, event)) = self.pending.pop_front() {
                events.push(event);
            }
        }
    }
}

const NEVER_PRESSED: i64 = i64::MIN;

/// Per-button "last pressed at" table shared between the update and render
/// activities.
#[derive(Debug)]
pub struct ButtonHighlight {
    pressed_at: [AtomicI64; BUTTON_COUNT as usize],
}

impl Default for ButtonHighlight {
    fn default() -> Self {
        Self {
            pressed_at: std::array::from_fn(|_| AtomicI64::new(NEVER_PRESSED)),
        }
    }
}

impl ButtonHighlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn button_pressed(&self, button: Button, at: MusicTime) {
        self.pressed_at[button.index()].fetch_max(at.as_micros(), Ordering::Relaxed);
    }

    /// Buttons pressed within `duration` before `now`.
    pub fn active(&self, now: MusicTime, duration: MusicTime) -> impl Iterator<Item = Button> + '_ {
        Button::all().filter(move |button| {
            let at = self.pressed_at[button.index()].load(Ordering::Relaxed);
            at != NEVER_PRESSED && {
                let elapsed = now - MusicTime::from_micros(at);
                elapsed >= MusicTime::ZERO && elapsed <= duration
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: i64) -> MusicTime {
        MusicTime::from_millis(value)
    }

    fn classifier() -> InputClassifier {
        let layout = PanelLayout {
            panel_size: 100.0,
            panel_spacing: 20.0,
            ribbon_x: 10.0,
            ribbon_y: 50.0,
        };
        InputClassifier::new(KeyMapping::default(), layout)
    }

    #[test]
    fn buttons_map_to_grid_coordinates() {
        let button = Button::new(6).unwrap();
        assert_eq!(button.coords(), (2, 1));
        assert_eq!(Button::from_coords(2, 1), Some(button));
        assert_eq!(Button::new(16), None);
        assert!(serde_json::from_str::<Button>("16").is_err());
    }

    #[test]
    fn pointer_hits_resolve_to_panels() {
        let classifier = classifier();
        let layout = classifier.layout();
        assert_eq!(layout.area_size(), 460);

        assert_eq!(layout.hit_test(10, 50), Button::new(0));
        assert_eq!(layout.hit_test(10 + 459, 50 + 459), Button::new(15));
        assert_eq!(layout.hit_test(10 + 120, 50 + 240), Button::new(9));
    }

    #[test]
    fn pointer_outside_the_panels_is_discarded() {
        let classifier = classifier();
        for (x, y) in [(9, 60), (10 + 460, 60), (20, 49), (20, 50 + 460), (-5, -5)] {
            let event = RawInput::PointerDown {
                x,
                y,
                button: PointerButton::Primary,
            };
            assert_eq!(classifier.classify(&event, ms(0)), None, "({x}, {y})");
        }
    }

    #[test]
    fn extreme_pointer_coordinates_are_discarded() {
        let layout = PanelLayout::default();
        for (x, y) in [
            (i32::MIN, 700),
            (i32::MAX, 700),
            (100, i32::MIN),
            (100, i32::MAX),
            (i32::MIN, i32::MIN),
        ] {
            assert_eq!(layout.hit_test(x, y), None, "({x}, {y})");
        }

        let far_ribbon = PanelLayout {
            ribbon_x: -2.0e9,
            ribbon_y: 2.0e9,
            ..PanelLayout::default()
        };
        assert_eq!(far_ribbon.hit_test(i32::MAX, i32::MIN), None);
    }

    #[test]
    fn panel_origins_follow_the_grid_step() {
        let layout = classifier().layout().clone();
        assert_eq!(layout.panel_origin(Button::new(0).unwrap()), (10.0, 50.0));
        assert_eq!(layout.panel_origin(Button::new(6).unwrap()), (250.0, 170.0));
        assert_eq!(layout.hit_test(250, 170), Button::new(6));
    }

    #[test]
    fn only_primary_pointer_presses_classify() {
        let classifier = classifier();
        let event = RawInput::PointerDown {
            x: 20,
            y: 60,
            button: PointerButton::Secondary,
        };
        assert_eq!(classifier.classify(&event, ms(0)), None);
    }

    #[test]
    fn keys_keep_the_observation_timestamp() {
        let classifier = classifier();
        let action = classifier.classify(&RawInput::KeyDown("G".into()), ms(1234));
        assert_eq!(
            action,
            Some(InputAction::Press {
                button: Button::new(9).unwrap(),
                at: ms(1234),
            })
        );
        assert_eq!(classifier.classify(&RawInput::KeyDown("Z".into()), ms(0)), None);
        assert_eq!(
            classifier.classify(&RawInput::Closed, ms(0)),
            Some(InputAction::Close)
        );
    }

    #[test]
    fn scripted_input_releases_events_in_time_order() {
        let mut input = ScriptedInput::new([
            (ms(200), RawInput::KeyDown("5".into())),
            (ms(100), RawInput::KeyDown("4".into())),
        ]);
        let mut events = Vec::new();

        input.poll_events(ms(50), &mut events);
        assert!(events.is_empty());

        input.poll_events(ms(150), &mut events);
        assert_eq!(events, vec![RawInput::KeyDown("4".into())]);

        input.poll_events(ms(1000), &mut events);
        assert_eq!(events.len(), 2);
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn highlights_fade_after_the_configured_duration() {
        let highlight = ButtonHighlight::new();
        let button = Button::new(3).unwrap();
        highlight.button_pressed(button, ms(1000));

        assert_eq!(highlight.active(ms(1100), ms(250)).collect::<Vec<_>>(), vec![button]);
        assert_eq!(highlight.active(ms(1300), ms(250)).count(), 0);
    }
}
