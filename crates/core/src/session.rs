use std::path::Path;

use basedrop::Owned;
use scrub_engine::{AudioEngineHandle, RenderEndpoint};
use scrub_transport::{ChannelMode, Command, LoopRange, Status, StereoBuffer, TransportState, pitch_ratio};
use scrub_vocoder::Resynthesizer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::time_pitch::{FixedTimePitch, TimePitchUnit};

type ProgressCallback = Box<dyn FnMut(f32)>;
type ScrubPausedCallback = Box<dyn FnMut()>;

/// Control surface over one engine instance.
///
/// Every setter is forwarded to the render thread as a `Command`; `poll`
/// drains what the render thread reported back and fires the callbacks.
/// Call `poll` regularly (e.g. once per UI frame).
pub struct Session {
    engine: AudioEngineHandle,
    config: Config,
    time_pitch: Box<dyn TimePitchUnit>,
    sound: Option<StereoBuffer>,
    progress: f32,
    playing: bool,
    scrubbing: bool,
    frozen: bool,
    looping: bool,
    channel_mode: ChannelMode,
    /// Rate to restore once scrubbing ends.
    saved_rate: Option<f32>,
    /// Whether the render thread holds, or is about to receive, a resynthesizer.
    resynth_live: bool,
    on_progress: Option<ProgressCallback>,
    on_scrub_paused: Option<ScrubPausedCallback>,
}

impl Session {
    /// Open the default output device.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let engine = scrub_engine::start(&config.engine)?;
        Ok(Self::with_engine(engine, config, Box::new(FixedTimePitch::default())))
    }

    /// A session without an audio device. The caller drives the endpoint.
    pub fn headless(config: Config) -> (Self, RenderEndpoint) {
        let (engine, endpoint) = scrub_engine::headless(&config.engine);
        (
            Self::with_engine(engine, config, Box::new(FixedTimePitch::default())),
            endpoint,
        )
    }

    pub fn with_engine(engine: AudioEngineHandle, config: Config, time_pitch: Box<dyn TimePitchUnit>) -> Self {
        let mut session = Self {
            engine,
            time_pitch,
            sound: None,
            progress: 0.0,
            playing: false,
            scrubbing: false,
            frozen: false,
            looping: false,
            channel_mode: ChannelMode::Lr,
            saved_rate: None,
            resynth_live: false,
            on_progress: None,
            on_scrub_paused: None,
            config,
        };
        session.set_channel_mode(session.config.channel_mode);
        session
    }

    pub fn on_progress(&mut self, callback: impl FnMut(f32) + 'static) {
        self.on_progress = Some(Box::new(callback));
    }

    pub fn on_scrub_paused(&mut self, callback: impl FnMut() + 'static) {
        self.on_scrub_paused = Some(Box::new(callback));
    }

    fn send(&mut self, command: Command) {
        if self.engine.commands.push(command).is_err() {
            warn!(?command, "command ring full, dropping command");
        }
    }

    fn fire_scrub_paused(&mut self) {
        if let Some(callback) = self.on_scrub_paused.as_mut() {
            callback();
        }
    }

    fn fire_progress(&mut self, progress: f32) {
        if let Some(callback) = self.on_progress.as_mut() {
            callback(progress);
        }
    }

    // Transport

    /// Start transport playback, from the beginning if the sound had ended.
    pub fn start(&mut self) {
        self.send(Command::Play);
        self.playing = true;
        self.scrubbing = false;
        self.restore_rate();
    }

    pub fn stop(&mut self) {
        self.send(Command::Stop);
        self.playing = false;
    }

    /// Move the scrub target to `progress` (0..=1) of the sound.
    ///
    /// Interrupts transport playback; the scrub-paused callback fires once
    /// the render thread confirms.
    pub fn scrub(&mut self, progress: f32) {
        self.playing = false;
        self.send(Command::Scrub { progress });
    }

    pub fn set_scrubbing(&mut self, scrubbing: bool) {
        self.scrubbing = scrubbing;
        if scrubbing {
            if self.saved_rate.is_none() {
                self.saved_rate = Some(self.time_pitch.rate());
            }
            self.time_pitch.set_rate(1.0);
            if !self.resynth_live {
                self.spawn_resynthesizer();
            }
        } else {
            self.restore_rate();
        }
        self.send(Command::SetScrubbing(scrubbing));
    }

    /// Latch scrubbing on with transport disabled, holding the scrub stream
    /// at the current playhead.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
        self.set_scrubbing(frozen);
        if frozen && self.playing {
            self.stop();
            self.fire_scrub_paused();
        }
    }

    /// Jump by `offset_secs`, clamped to the sound.
    pub fn seek(&mut self, offset_secs: f64) {
        let offset = (offset_secs * self.engine.sample_rate as f64).round() as i64;
        self.send(Command::Seek { offset });
    }

    pub fn seek_forward(&mut self) {
        self.seek(self.config.seek_step_secs);
    }

    pub fn seek_backward(&mut self) {
        self.seek(-self.config.seek_step_secs);
    }

    fn restore_rate(&mut self) {
        if let Some(rate) = self.saved_rate.take() {
            self.time_pitch.set_rate(rate);
        }
    }

    // Looping

    /// Loop between two fractions of the sound. Ignored with no sound loaded.
    pub fn set_loop_progress_range(&mut self, lower: f32, upper: f32) {
        let Some(frames) = self.sound.as_ref().map(StereoBuffer::frames) else {
            return;
        };
        let range = LoopRange::from_progress(lower, upper, frames);
        debug!(start = range.start, end = range.end, "loop range");
        self.send(Command::SetLoopRange(Some(range)));
    }

    pub fn enable_looping(&mut self) {
        self.looping = true;
        self.send(Command::SetLooping(true));
    }

    pub fn disable_looping(&mut self) {
        self.looping = false;
        self.send(Command::SetLooping(false));
    }

    // Effects

    pub fn set_filter_freq_range(&mut self, low_hz: f32, high_hz: f32) {
        self.send(Command::SetFilterRange { low_hz, high_hz });
    }

    pub fn set_pitch_shift(&mut self, semitones: f32, cents: f32) {
        self.time_pitch.set_pitch_cents(semitones * 100.0 + cents);
        self.send(Command::SetPitchShift {
            ratio: pitch_ratio(semitones, cents),
        });
    }

    /// Transport playback rate. While scrubbing, takes effect when scrubbing ends.
    pub fn set_speed(&mut self, rate: f32) {
        match self.saved_rate.as_mut() {
            Some(saved) => *saved = rate,
            None => self.time_pitch.set_rate(rate),
        }
    }

    pub fn set_channel_mode(&mut self, mode: ChannelMode) {
        self.channel_mode = mode;
        self.send(Command::SetChannelMode(mode));
    }

    // Sound

    /// Replace the sound. The playhead returns to the start.
    pub fn set_sound(&mut self, sound: StereoBuffer) {
        if !self.engine.send_buffer(sound.clone()) {
            warn!("control rings full, sound not installed");
            return;
        }

        self.sound = Some(sound);
        self.progress = 0.0;
        // The render thread drops the old stream along with the old sound.
        self.resynth_live = false;
        if self.scrubbing {
            self.spawn_resynthesizer();
        }
    }

    /// Decode `path` at the engine rate and install it.
    pub fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let sound = scrub_decode::load_sound(path, self.engine.sample_rate)?;
        self.set_sound(sound);
        Ok(())
    }

    /// Stop everything and drop the sound.
    pub fn reset(&mut self) {
        self.send(Command::Reset);
        self.playing = false;
        self.scrubbing = false;
        self.frozen = false;
        self.looping = false;
        self.restore_rate();
        self.sound = None;
        self.progress = 0.0;
        self.channel_mode = ChannelMode::Lr;
        self.resynth_live = false;
        info!("session reset");
    }

    // The stream stays idle until the render thread points it at its
    // playhead on install.
    fn spawn_resynthesizer(&mut self) {
        let Some(sound) = self.sound.clone() else {
            return;
        };

        match Resynthesizer::spawn_idle(sound) {
            Ok(resynth) => {
                if self.engine.resynths.push(Owned::new(&self.engine.handle, resynth)).is_err() {
                    warn!("resynthesizer ring full");
                    return;
                }
                self.resynth_live = true;
                debug!("resynthesizer sent");
            }
            Err(e) => error!("failed to start resynthesis worker: {e}"),
        }
    }

    /// Drain render-thread reports and fire callbacks. Returns the latest
    /// progress if any arrived.
    pub fn poll(&mut self) -> Option<f32> {
        let mut progress = None;
        while let Ok(status) = self.engine.status.pop() {
            match status {
                Status::Progress(p) => {
                    self.progress = p;
                    progress = Some(p);
                    self.fire_progress(p);
                }
                Status::ScrubPaused => {
                    self.playing = false;
                    self.fire_scrub_paused();
                }
                Status::ResynthesizerRequested => {
                    if !self.resynth_live {
                        self.spawn_resynthesizer();
                    }
                }
                Status::ResynthesizerReleased => {
                    self.resynth_live = false;
                    debug!("resynthesizer released");
                }
                Status::Underrun(frames) => warn!(frames, "resynthesis underrun"),
            }
        }
        self.engine.collector.collect();
        progress
    }

    // Queries

    pub fn transport_state(&self) -> TransportState {
        if self.frozen {
            TransportState::Frozen
        } else if self.scrubbing {
            TransportState::Scrubbing
        } else if self.playing {
            TransportState::Playing
        } else {
            TransportState::Stopped
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrubbing
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn sound(&self) -> Option<&StereoBuffer> {
        self.sound.as_ref()
    }

    pub fn channel_mode(&self) -> ChannelMode {
        self.channel_mode
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.sample_rate
    }

    pub fn time_pitch(&self) -> &dyn TimePitchUnit {
        self.time_pitch.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use scrub_engine::{FADE_FRAMES, Passthrough, headless_with_effects};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn session() -> (Session, RenderEndpoint) {
        let config = Config::default();
        let (engine, endpoint) = headless_with_effects(
            &config.engine,
            [Box::new(Passthrough::default()), Box::new(Passthrough::default())],
        );
        (
            Session::with_engine(engine, config, Box::new(FixedTimePitch::default())),
            endpoint,
        )
    }

    fn constant(frames: usize) -> StereoBuffer {
        StereoBuffer::new(vec![0.5; frames], vec![0.5; frames], 44100)
    }

    fn run(endpoint: &mut RenderEndpoint, frames: usize) {
        let mut remaining = frames;
        while remaining > 0 {
            let block = remaining.min(128);
            endpoint.process(block, |_, _, _| {});
            remaining -= block;
        }
    }

    #[test]
    fn test_progress_callback_fires_while_playing() {
        let (mut session, mut endpoint) = session();
        let seen = Rc::new(RefCell::new(Vec::new()));
        session.on_progress({
            let seen = Rc::clone(&seen);
            move |p| seen.borrow_mut().push(p)
        });

        session.set_sound(constant(1280));
        session.start();
        run(&mut endpoint, 256);

        assert_eq!(session.poll(), Some(0.2));
        assert_eq!(*seen.borrow(), vec![0.1, 0.2]);
        assert_eq!(session.transport_state(), TransportState::Playing);
    }

    #[test]
    fn test_end_of_sound_fires_scrub_paused() {
        let (mut session, mut endpoint) = session();
        let paused = Rc::new(Cell::new(0));
        session.on_scrub_paused({
            let paused = Rc::clone(&paused);
            move || paused.set(paused.get() + 1)
        });

        session.set_sound(constant(300));
        session.start();
        run(&mut endpoint, 512);
        session.poll();

        assert_eq!(paused.get(), 1);
        assert!(!session.is_playing());
        assert_eq!(session.progress(), 1.0);
    }

    #[test]
    fn test_scrub_while_playing_pauses() {
        let (mut session, mut endpoint) = session();
        let paused = Rc::new(Cell::new(0));
        session.on_scrub_paused({
            let paused = Rc::clone(&paused);
            move || paused.set(paused.get() + 1)
        });

        session.set_sound(constant(44_100));
        session.start();
        run(&mut endpoint, 128);
        session.scrub(0.5);
        run(&mut endpoint, 128);
        session.poll();

        assert_eq!(paused.get(), 1);
        assert_eq!(session.transport_state(), TransportState::Stopped);
        assert!(!endpoint.scheduler().state().is_playing());
    }

    #[test]
    fn test_scrubbing_spawns_resynthesizer_and_pins_rate() {
        let (mut session, mut endpoint) = session();
        session.set_sound(constant(20_000));
        session.set_speed(0.5);

        session.set_scrubbing(true);
        assert_eq!(session.time_pitch().rate(), 1.0);
        run(&mut endpoint, 128);
        assert!(endpoint.scheduler().state().has_resynthesizer());
        assert_eq!(session.transport_state(), TransportState::Scrubbing);

        // Speed changes while scrubbing wait for the scrub to end.
        session.set_speed(0.75);
        assert_eq!(session.time_pitch().rate(), 1.0);

        session.set_scrubbing(false);
        assert_eq!(session.time_pitch().rate(), 0.75);
    }

    #[test]
    fn test_released_resynthesizer_is_rebuilt_on_next_scrub() {
        let (mut session, mut endpoint) = session();
        session.set_sound(constant(20_000));

        session.set_scrubbing(true);
        run(&mut endpoint, FADE_FRAMES);
        session.set_scrubbing(false);
        run(&mut endpoint, FADE_FRAMES);
        session.poll();
        assert!(!endpoint.scheduler().state().has_resynthesizer());
        assert!(!session.resynth_live);

        session.set_scrubbing(true);
        assert!(session.resynth_live);
        run(&mut endpoint, 128);
        assert!(endpoint.scheduler().state().has_resynthesizer());
    }

    #[test]
    fn test_requested_resynthesizer_is_supplied() {
        let (mut session, mut endpoint) = session();
        session.set_sound(constant(20_000));
        run(&mut endpoint, 128);

        // The render thread asks for a stream it never received.
        session.resynth_live = false;
        assert!(session.engine.commands.push(Command::SetScrubbing(true)).is_ok());
        run(&mut endpoint, 128);
        session.poll();
        assert!(session.resynth_live);

        run(&mut endpoint, 128);
        assert!(endpoint.scheduler().state().has_resynthesizer());
    }

    #[test]
    fn test_scrub_gesture_starts_at_the_scrubbed_position() {
        let (mut session, mut endpoint) = session();
        // A loud first quarter, silence after it.
        let mut left = vec![0.0f32; 80_000];
        for (i, sample) in left.iter_mut().take(20_000).enumerate() {
            *sample = 0.8 * (i as f32 * 0.05).sin();
        }
        session.set_sound(StereoBuffer::new(left.clone(), left, 44100));
        session.seek(0.2);
        run(&mut endpoint, 128);
        session.poll();

        session.set_scrubbing(true);
        run(&mut endpoint, FADE_FRAMES);
        session.set_scrubbing(false);
        run(&mut endpoint, FADE_FRAMES);
        session.poll();
        assert!(!endpoint.scheduler().state().has_resynthesizer());

        session.scrub(0.75);
        run(&mut endpoint, 128);
        assert_eq!(session.poll(), Some(0.75));
        assert_eq!(session.progress(), 0.75);
        assert_eq!(endpoint.scheduler().state().playhead(), 60_000);

        session.set_scrubbing(true);
        let mut peak = 0.0f32;
        for _ in 0..32 {
            endpoint.process(128, |_, l, r| peak = peak.max(l.abs()).max(r.abs()));
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(peak < 1e-3, "peak {peak}");
        assert!(endpoint.scheduler().state().has_resynthesizer());
    }

    #[test]
    fn test_seek_right_after_set_sound() {
        let (mut session, mut endpoint) = session();
        session.set_sound(constant(1000));
        run(&mut endpoint, 128);

        session.set_sound(constant(4 * 44_100));
        session.seek(1.0);
        run(&mut endpoint, 128);

        assert_eq!(endpoint.scheduler().state().playhead(), 44_100);
        assert_eq!(session.poll(), Some(0.25));
    }

    #[test]
    fn test_freeze_stops_playback() {
        let (mut session, mut endpoint) = session();
        let paused = Rc::new(Cell::new(0));
        session.on_scrub_paused({
            let paused = Rc::clone(&paused);
            move || paused.set(paused.get() + 1)
        });
        session.set_sound(constant(20_000));
        session.start();
        run(&mut endpoint, 128);

        session.set_frozen(true);

        assert_eq!(paused.get(), 1);
        assert_eq!(session.transport_state(), TransportState::Frozen);
        run(&mut endpoint, 128);
        let state = endpoint.scheduler().state();
        assert!(!state.is_playing());
        assert!(state.is_scrubbing());

        session.set_frozen(false);
        assert_eq!(session.transport_state(), TransportState::Stopped);
    }

    #[test]
    fn test_pitch_shift_sets_cents_and_ratio() {
        let (mut session, _endpoint) = session();
        session.set_pitch_shift(-2.0, 50.0);

        assert_eq!(session.time_pitch().pitch_cents(), -150.0);
        assert_relative_eq!(pitch_ratio(-2.0, 50.0), 2f32.powf(-1.5 / 12.0));
    }

    #[test]
    fn test_seek_is_in_seconds() {
        let (mut session, mut endpoint) = session();
        session.set_sound(constant(44_100 * 10));
        run(&mut endpoint, 128);

        session.seek(2.5);
        session.seek_forward();
        run(&mut endpoint, 128);

        assert_eq!(endpoint.scheduler().state().playhead(), 44_100 * 15 / 2);
        assert_eq!(session.poll(), Some(0.75));
    }

    #[test]
    fn test_loop_range_needs_a_sound() {
        let (mut session, mut endpoint) = session();
        session.set_loop_progress_range(0.1, 0.2);
        session.enable_looping();
        run(&mut endpoint, 128);
        assert_eq!(endpoint.scheduler().state().loop_range(), None);

        session.set_sound(constant(1000));
        session.set_loop_progress_range(0.1, 0.2);
        run(&mut endpoint, 128);
        let state = endpoint.scheduler().state();
        assert_eq!(state.loop_range(), Some(LoopRange::new(100, 200)));
        assert!(state.is_looping());
    }

    #[test]
    fn test_reset_then_load_keeps_new_sound() {
        let (mut session, mut endpoint) = session();
        session.set_sound(constant(1000));
        session.set_channel_mode(ChannelMode::Mono);
        session.start();
        run(&mut endpoint, 128);

        session.reset();
        session.set_sound(constant(500));
        run(&mut endpoint, 128);

        let state = endpoint.scheduler().state();
        assert_eq!(state.frames(), 500);
        assert_eq!(state.channel_mode(), ChannelMode::Lr);
        assert!(!state.is_playing());
        assert_eq!(session.channel_mode(), ChannelMode::Lr);
    }

    #[test]
    fn test_config_channel_mode_is_applied() {
        let config = Config {
            channel_mode: ChannelMode::R,
            ..Config::default()
        };
        let (engine, mut endpoint) = headless_with_effects(
            &config.engine,
            [Box::new(Passthrough::default()), Box::new(Passthrough::default())],
        );
        let session = Session::with_engine(engine, config, Box::new(FixedTimePitch::default()));
        run(&mut endpoint, 1);

        assert_eq!(session.channel_mode(), ChannelMode::R);
        assert_eq!(endpoint.scheduler().state().channel_mode(), ChannelMode::R);
    }
}
