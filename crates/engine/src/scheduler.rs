//! The render step: transport playback, resynthesized scrubbing and the
//! crossfades between them.

use basedrop::{Owned, Shared};
use scrub_transport::{ChannelMode, Command, LoopRange, Status, StereoBuffer};
use scrub_vocoder::Resynthesizer;

use crate::EngineConfig;
use crate::effects::{EffectsStage, FilterStage};
use crate::ramp::CrossfadeRamp;

/// Everything the render step reads and writes.
///
/// Owned by exactly one `PlaybackScheduler`; the control side only sees it
/// through `Command`s and `Status`es.
#[derive(Default)]
pub struct EngineState {
    buffer: Option<Shared<StereoBuffer>>,
    playhead: usize,
    transport_ramp: CrossfadeRamp,
    scrub_ramp: CrossfadeRamp,
    playing: bool,
    scrubbing: bool,
    looping: bool,
    loop_range: Option<LoopRange>,
    channel_mode: ChannelMode,
    resynth: Option<Owned<Resynthesizer>>,
}

impl EngineState {
    pub fn buffer(&self) -> Option<&StereoBuffer> {
        self.buffer.as_deref()
    }

    pub fn playhead(&self) -> usize {
        self.playhead
    }

    pub fn progress(&self) -> f32 {
        progress(self.playhead, self.frames())
    }

    pub fn frames(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.frames())
    }

    pub fn transport_gain(&self) -> f32 {
        self.transport_ramp.value()
    }

    pub fn scrub_gain(&self) -> f32 {
        self.scrub_ramp.value()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrubbing
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn loop_range(&self) -> Option<LoopRange> {
        self.loop_range
    }

    pub fn channel_mode(&self) -> ChannelMode {
        self.channel_mode
    }

    pub fn has_resynthesizer(&self) -> bool {
        self.resynth.is_some()
    }
}

/// What happened during one block, for the caller to turn into `Status`es.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockReport {
    pub progress: Option<f32>,
    pub scrub_paused: bool,
    pub resynth_released: bool,
    pub underruns: u32,
}

fn progress(playhead: usize, frames: usize) -> f32 {
    if frames == 0 {
        0.0
    } else {
        playhead as f32 / frames as f32
    }
}

pub struct PlaybackScheduler {
    state: EngineState,
    effects: [Box<dyn EffectsStage>; 2],
}

impl PlaybackScheduler {
    /// `effects[0]` processes the left channel, `effects[1]` the right.
    pub fn new(effects: [Box<dyn EffectsStage>; 2]) -> Self {
        Self {
            state: EngineState::default(),
            effects,
        }
    }

    /// Scheduler with a `FilterStage` per channel set to the configured range.
    pub fn with_filters(sample_rate: u32, config: &EngineConfig) -> Self {
        let mut scheduler = Self::new([
            Box::new(FilterStage::new(sample_rate)),
            Box::new(FilterStage::new(sample_rate)),
        ]);
        scheduler.apply(Command::SetFilterRange {
            low_hz: config.filter_low_hz,
            high_hz: config.filter_high_hz,
        });
        scheduler
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Apply one control command. Real-time safe.
    pub fn apply(&mut self, command: Command) -> Option<Status> {
        let state = &mut self.state;
        match command {
            Command::Play => {
                if state.playhead == state.frames() {
                    state.playhead = 0;
                }
                state.playing = true;
                state.scrubbing = false;
            }
            Command::Stop => state.playing = false,
            Command::Scrub { progress } => return self.scrub(progress),
            Command::SetScrubbing(scrubbing) => {
                state.scrubbing = scrubbing;
                if scrubbing && state.resynth.is_none() && state.buffer.is_some() {
                    return Some(Status::ResynthesizerRequested);
                }
            }
            Command::Seek { offset } => {
                let frames = state.frames();
                let last = frames.saturating_sub(1) as i64;
                state.playhead = (state.playhead as i64).saturating_add(offset).clamp(0, last) as usize;
                return Some(Status::Progress(progress(state.playhead, frames.max(1))));
            }
            Command::SetLoopRange(range) => state.loop_range = range,
            Command::SetLooping(looping) => state.looping = looping,
            Command::SetFilterRange { low_hz, high_hz } => {
                for fx in &mut self.effects {
                    fx.set_high_pass_freq(low_hz);
                    fx.set_low_pass_freq(high_hz);
                }
            }
            Command::SetPitchShift { ratio } => {
                for fx in &mut self.effects {
                    fx.set_pitch_shift(ratio);
                }
            }
            Command::SetChannelMode(mode) => state.channel_mode = mode,
            Command::Reset => self.state = EngineState::default(),
            // The buffer ring belongs to the endpoint, which installs through
            // `install_buffer`.
            Command::InstallBuffer => {}
        }
        None
    }

    /// Returns `ScrubPaused` if transport was interrupted, otherwise the new
    /// progress if the playhead moved.
    fn scrub(&mut self, fraction: f32) -> Option<Status> {
        let state = &mut self.state;
        let paused = std::mem::replace(&mut state.playing, false);

        let frames = state.frames();
        if frames == 0 {
            return paused.then_some(Status::ScrubPaused);
        }

        // Only jump once the transport has fully faded out.
        let mut jumped = false;
        if state.transport_ramp.is_silent() {
            let target = (fraction.clamp(0.0, 1.0) * frames as f32) as usize;
            state.playhead = target.min(frames - 1);
            jumped = true;
        }
        if let Some(resynth) = &state.resynth {
            resynth.set_playhead_position(state.playhead);
        }

        if paused {
            Some(Status::ScrubPaused)
        } else if jumped {
            Some(Status::Progress(progress(state.playhead, frames)))
        } else {
            None
        }
    }

    /// Replace the sound. The playhead returns to 0 and any resynthesizer
    /// built for the old sound is dropped.
    pub fn install_buffer(&mut self, buffer: Shared<StereoBuffer>) -> Option<Status> {
        let state = &mut self.state;
        state.buffer = Some(buffer);
        state.playhead = 0;
        state.resynth = None;
        state.scrubbing.then_some(Status::ResynthesizerRequested)
    }

    pub fn install_resynthesizer(&mut self, resynth: Owned<Resynthesizer>) {
        resynth.set_playhead_position(self.state.playhead);
        self.state.resynth = Some(resynth);
    }

    /// Render `frames` output frames, handing each remapped pair to `sink`
    /// along with its index in the block.
    pub fn render(&mut self, frames: usize, mut sink: impl FnMut(usize, f32, f32)) -> BlockReport {
        let mut report = BlockReport::default();
        let Self { state, effects } = self;
        let [fx_l, fx_r] = effects;

        let Some(buffer) = state.buffer.as_deref() else {
            for i in 0..frames {
                sink(i, 0.0, 0.0);
            }
            return report;
        };
        let len = buffer.frames();

        for i in 0..frames {
            let scrub_gain = state.scrub_ramp.step(state.scrubbing);
            let transport_gain = state.transport_ramp.step(state.playing);

            let (l, r) = match state.resynth.as_deref_mut() {
                Some(resynth) if state.transport_ramp.is_silent() => {
                    let (l, r) = resynth.pop_next_sample();
                    (fx_l.process(l) * scrub_gain, fx_r.process(r) * scrub_gain)
                }
                // Scrub fading in with no stream installed yet is silent too.
                _ if !state.playing && state.transport_ramp.is_silent() => (0.0, 0.0),
                _ => {
                    if state.playhead >= len {
                        state.playing = false;
                        state.transport_ramp.reset();
                        report.progress = Some(progress(state.playhead, len));
                        report.scrub_paused = true;
                        for j in i..frames {
                            sink(j, 0.0, 0.0);
                        }
                        break;
                    }

                    if state.looping {
                        if let Some(range) = state.loop_range {
                            if state.playhead > range.end {
                                state.playhead = range.start;
                            }
                        }
                    }

                    let (l, r) = buffer.frame(state.playhead);
                    state.playhead += 1;
                    (fx_l.process(l) * transport_gain, fx_r.process(r) * transport_gain)
                }
            };

            let (l, r) = state.channel_mode.remap(l, r);
            sink(i, l, r);
        }

        if let Some(resynth) = state.resynth.as_deref_mut() {
            report.underruns = resynth.take_underruns();
            if state.scrub_ramp.is_silent() && !state.scrubbing {
                state.resynth = None;
                report.resynth_released = true;
            }
        }

        if state.playing {
            report.progress = Some(progress(state.playhead, len));
        }

        report
    }
}
