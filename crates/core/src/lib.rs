//! Core library for the jujube rhythm game.
//!
//! A chart is a list of timed notes on a 4x4 grid of panels. The player
//! presses panels in time with the music and every note gets judged exactly
//! once, either by a press or by the miss sweep. Timing comes from a
//! [`TimeSource`]: the playing audio track corrected for reporting lag, or a
//! wall clock when there is no audio. Windowing, graphics and decoding live
//! outside this crate behind the [`InputSource`], [`Presenter`] and
//! [`AudioBackend`] traits.

pub mod audio;
pub mod chart;
pub mod clock;
pub mod config;
pub mod error;
pub mod gameplay;
pub mod input;
pub mod judgment;
pub mod mapping;
pub mod render;
pub mod score;
pub mod time;
pub mod timeline;

pub use audio::{AudioBackend, AudioStream, PlaybackStatus, SimulatedBackend, SimulatedStream};
pub use chart::{Chart, Note, TimeBounds};
pub use clock::{ClockStatus, LagEstimator, PlaybackClock, SilentClock, TimeSource};
pub use config::{AppConfig, AudioConfig, TimingConfig};
pub use error::{JujubeError, Result};
pub use gameplay::{GameplayLoop, SessionState};
pub use input::{
    Button, ButtonHighlight, InputAction, InputClassifier, InputSource, PanelLayout,
    PointerButton, RawInput, ScriptedInput, BUTTON_COUNT, GRID_SIZE,
};
pub use judgment::{Judgment, JudgmentEvent, JudgmentResult, TimingWindows};
pub use mapping::{InputBinding, KeyMapping, MappingDescriptor};
pub use render::{FrameBuilder, NoteSprite, Presenter, RenderFrame, SpriteState};
pub use score::{ScoreSnapshot, ScoreTally};
pub use time::MusicTime;
pub use timeline::{HitOutcome, NoteSlot, NoteTimeline};
