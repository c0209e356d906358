use crate::{
    Button, ButtonHighlight, Judgment, JudgmentEvent, MusicTime, NoteTimeline, TimingConfig,
};

/// What the presenter should show for one note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpriteState {
    /// Not judged yet; `remaining` is the time left until the target time.
    Approach { remaining: MusicTime },
    /// Judged `elapsed` ago.
    Judged { judgment: Judgment, elapsed: MusicTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteSprite {
    pub index: usize,
    pub position: Button,
    pub state: SpriteState,
}

/// Everything a presenter needs for one frame. Drawing itself happens
/// outside the core.
#[derive(Debug, Clone, Copy)]
pub struct RenderFrame<'a> {
    pub music_time: MusicTime,
    pub cursor: usize,
    pub viewport: Option<(u32, u32)>,
    pub sprites: &'a [NoteSprite],
    pub highlights: &'a [Button],
    /// Judgments published since the previous frame.
    pub judgments: &'a [JudgmentEvent],
}

/// Presentation collaborator, driven by the render activity.
pub trait Presenter {
    fn present(&mut self, frame: &RenderFrame<'_>);
}

/// Builds draw lists, reusing its buffers from frame to frame.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    sprites: Vec<NoteSprite>,
    highlights: Vec<Button>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the notes worth drawing at `music_time`: everything from the
    /// cursor up to the visible horizon, plus notes judged recently enough
    /// that their judgment animation is still playing.
    pub fn build<'a>(
        &'a mut self,
        timeline: &NoteTimeline,
        music_time: MusicTime,
        timing: &TimingConfig,
        highlight: &ButtonHighlight,
        viewport: Option<(u32, u32)>,
        judgments: &'a [JudgmentEvent],
    ) -> RenderFrame<'a> {
        let trail = timing.windows.miss_window();
        let horizon = music_time + timing.visible_horizon;
        let cursor = timeline.cursor();
        let start = cursor.min(timeline.lower_bound(music_time - trail));

        self.sprites.clear();
        for (index, slot) in timeline.slots().iter().enumerate().skip(start) {
            if slot.timing() > horizon {
                break;
            }
            let state = match slot.judgment() {
                None => SpriteState::Approach {
                    remaining: slot.timing() - music_time,
                },
                Some(result) => {
                    let elapsed = music_time - (slot.timing() + result.error);
                    if index < cursor && elapsed > trail {
                        continue;
                    }
                    SpriteState::Judged {
                        judgment: result.judgment,
                        elapsed,
                    }
                }
            };
            self.sprites.push(NoteSprite {
                index,
                position: slot.position(),
                state,
            });
        }

        self.highlights.clear();
        self.highlights
            .extend(highlight.active(music_time, timing.highlight_duration));

        RenderFrame {
            music_time,
            cursor,
            viewport,
            sprites: &self.sprites,
            highlights: &self.highlights,
            judgments,
        }
    }
}
