//! One play session: two activities sharing the note timeline.
//!
//! The update activity runs on the caller's thread and handles input, the
//! render activity runs on a scoped thread and produces frames. Both sweep
//! the timeline for misses, so a stalled update never leaves a note on screen
//! past its deadline. Judgments travel to the score tally over a channel;
//! the timeline itself is only touched through atomics.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::{
    AppConfig, AudioBackend, Button, ButtonHighlight, Chart, ClockStatus, FrameBuilder, HitOutcome,
    InputAction, InputClassifier, InputSource, JudgmentEvent, JudgmentResult, MusicTime, Note,
    NoteTimeline, PlaybackClock, Presenter, Result, ScoreSnapshot, ScoreTally, SilentClock,
    TimeSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Finished,
}

/// Owns everything a session shares between its two activities.
#[derive(Debug)]
pub struct GameplayLoop {
    timeline: NoteTimeline,
    clock: TimeSource,
    config: AppConfig,
    classifier: InputClassifier,
    highlight: ButtonHighlight,
    finished: AtomicBool,
    viewport: AtomicU64,
    outcome: Option<ScoreSnapshot>,
}

impl GameplayLoop {
    pub fn new(chart: &Chart, clock: TimeSource, config: &AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            timeline: NoteTimeline::new(chart.notes.iter().copied()),
            clock,
            config: config.clone(),
            classifier: InputClassifier::new(config.key_mapping.clone(), config.layout.clone()),
            highlight: ButtonHighlight::new(),
            finished: AtomicBool::new(false),
            viewport: AtomicU64::new(0),
            outcome: None,
        })
    }

    /// Builds a session for `chart`, playing `audio` when given. A track that
    /// cannot be opened fails the whole call; use
    /// [`silent_clock`](Self::silent_clock) to fall back.
    pub fn with_audio(
        chart: &Chart,
        audio: Option<(&dyn AudioBackend, &Path)>,
        config: &AppConfig,
    ) -> Result<Self> {
        let clock = match audio {
            Some((backend, path)) => {
                TimeSource::from(PlaybackClock::open(backend, path, &config.audio)?)
            }
            None => TimeSource::from(Self::silent_clock(chart, config)),
        };
        Self::new(chart, clock, config)
    }

    /// Silent time source lasting until the last note can no longer be hit.
    pub fn silent_clock(chart: &Chart, config: &AppConfig) -> SilentClock {
        let last = chart.last_event_timing().unwrap_or(MusicTime::ZERO);
        SilentClock::new(last.max(MusicTime::ZERO) + config.timing.windows.miss_window())
    }

    pub fn state(&self) -> SessionState {
        if self.finished.load(Ordering::Acquire) {
            SessionState::Finished
        } else {
            SessionState::Running
        }
    }

    pub fn timeline(&self) -> &NoteTimeline {
        &self.timeline
    }

    pub fn clock(&self) -> &TimeSource {
        &self.clock
    }

    /// Time source reading with the user's audio offset applied.
    pub fn music_time(&self) -> MusicTime {
        self.clock.current_time() + self.config.audio.offset
    }

    /// Ends the session; both activities exit at their next iteration.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Handles one logical press observed at `at`. Presses only judge notes
    /// while the time source is playing.
    pub fn handle_press(
        &self,
        button: Button,
        at: MusicTime,
        events: &Sender<JudgmentEvent>,
    ) -> HitOutcome {
        self.highlight.button_pressed(button, at);
        if self.clock.status() != ClockStatus::Playing {
            return HitOutcome::Ghost;
        }

        let windows = &self.config.timing.windows;
        self.sweep(at, events);
        let outcome = self.timeline.resolve_hit(button, at, windows);
        match outcome {
            HitOutcome::Judged { index, result } => {
                if let Some(slot) = self.timeline.get(index) {
                    publish(events, index, slot.note(), result);
                }
            }
            HitOutcome::Contested { index, existing } => {
                tracing::debug!(index, ?existing, "press lost the race against the miss sweep");
            }
            HitOutcome::Ghost => tracing::trace!(%button, %at, "ghost press"),
        }
        outcome
    }

    /// Runs the session to completion and returns the final score. The
    /// session ends when the time source finishes or when the input source
    /// reports a close.
    ///
    /// A finished time source is frozen and presses are ghosts from then on,
    /// so notes still pending in the visible horizon can never be judged by
    /// time or input. The session does not wait for them: the teardown flush
    /// resolves them as misses.
    pub fn run<I, P>(&mut self, input: &mut I, presenter: &mut P) -> Result<ScoreSnapshot>
    where
        I: InputSource,
        P: Presenter + Send,
    {
        if let Some(outcome) = &self.outcome {
            tracing::warn!("session already finished, returning its score");
            return Ok(outcome.clone());
        }

        let (sender, receiver) = crossbeam_channel::unbounded();
        tracing::info!(
            notes = self.timeline.len(),
            silent = self.clock.is_silent(),
            "session started"
        );
        self.clock.start();

        let session = &*self;
        let activities = thread::scope(|scope| -> Result<ScoreTally> {
            let render = {
                let sender = sender.clone();
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name("render".into())
                    .spawn_scoped(scope, move || {
                        session.render_activity(presenter, &sender, &receiver)
                    })
            };
            let render = match render {
                Ok(handle) => handle,
                Err(err) => {
                    session.finish();
                    return Err(err.into());
                }
            };
            session.update_activity(input, &sender);
            match render.join() {
                Ok(tally) => Ok(tally),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        });

        self.clock.stop();
        let mut tally = activities?;

        let mut flushed = 0_usize;
        self.timeline.resolve_remaining(|index, note, result| {
            publish(&sender, index, note, result);
            flushed += 1;
        });
        drop(sender);
        for event in receiver.try_iter() {
            tally.record(&event);
        }

        if let TimeSource::Playback(clock) = &mut self.clock {
            clock.shutdown();
        }

        let score = tally.snapshot();
        tracing::info!(
            judged = score.judged(),
            flushed,
            misses = score.miss,
            "session finished"
        );
        self.outcome = Some(score.clone());
        Ok(score)
    }

    fn update_activity<I: InputSource>(&self, input: &mut I, events: &Sender<JudgmentEvent>) {
        let _guard = FinishOnDrop(&self.finished);
        let poll = self.config.audio.input_poll_interval.to_duration();
        let horizon = self.config.timing.visible_horizon;
        let mut raw = Vec::new();

        while self.state() == SessionState::Running {
            let music_time = self.music_time();
            raw.clear();
            input.poll_events(music_time, &mut raw);
            for event in &raw {
                match self.classifier.classify(event, music_time) {
                    Some(InputAction::Press { button, at }) => {
                        self.handle_press(button, at, events);
                    }
                    Some(InputAction::Resize { width, height }) => {
                        self.viewport
                            .store((u64::from(width) << 32) | u64::from(height), Ordering::Relaxed);
                    }
                    Some(InputAction::Close) => {
                        tracing::info!(%music_time, "window closed");
                        self.finish();
                    }
                    None => {}
                }
            }

            let now = self.music_time();
            self.sweep(now, events);
            if self.clock.status() == ClockStatus::Finished {
                let pending = self.timeline.has_pending_until(now + horizon);
                tracing::debug!(%now, pending, "song finished");
                self.finish();
            }
            thread::sleep(poll);
        }
    }

    fn render_activity<P: Presenter>(
        &self,
        presenter: &mut P,
        events: &Sender<JudgmentEvent>,
        judgments: &Receiver<JudgmentEvent>,
    ) -> ScoreTally {
        let _guard = FinishOnDrop(&self.finished);
        let mut tally = ScoreTally::new(self.timeline.len());
        let mut builder = FrameBuilder::new();
        let mut fresh = Vec::new();

        while self.state() == SessionState::Running {
            let music_time = self.music_time();
            self.sweep(music_time, events);

            fresh.clear();
            fresh.extend(judgments.try_iter());
            for event in &fresh {
                tally.record(event);
            }

            let frame = builder.build(
                &self.timeline,
                music_time,
                &self.config.timing,
                &self.highlight,
                self.viewport(),
                &fresh,
            );
            presenter.present(&frame);
        }
        tally
    }

    fn sweep(&self, music_time: MusicTime, events: &Sender<JudgmentEvent>) {
        self.timeline.advance_cursor_with(
            music_time,
            self.config.timing.windows.miss_window(),
            |index, note, result| publish(events, index, note, result),
        );
    }

    fn viewport(&self) -> Option<(u32, u32)> {
        match self.viewport.load(Ordering::Relaxed) {
            0 => None,
            packed => Some(((packed >> 32) as u32, packed as u32)),
        }
    }
}

fn publish(events: &Sender<JudgmentEvent>, index: usize, note: &Note, result: JudgmentResult) {
    let event = JudgmentEvent {
        index,
        position: note.position,
        timing: note.timing,
        result,
    };
    // The receiver outlives both activities, so a failed send only happens
    // while the session is being torn down.
    let _ = events.send(event);
}

/// Flags the session as finished when an activity exits, normally or not.
struct FinishOnDrop<'a>(&'a AtomicBool);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}
