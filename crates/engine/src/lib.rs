use basedrop::{Collector, Handle, Owned, Shared};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use scrub_transport::{Command, Status, StereoBuffer};
use scrub_vocoder::Resynthesizer;
use tracing::{debug, error, info, warn};

mod config;
mod effects;
mod endpoint;
mod ramp;
mod scheduler;

pub use config::EngineConfig;
pub use effects::{DEFAULT_HIGH_PASS_HZ, DEFAULT_LOW_PASS_HZ, EffectsStage, FilterStage, Passthrough};
pub use endpoint::RenderEndpoint;
pub use ramp::{CrossfadeRamp, FADE_FRAMES, FADE_STEP};
pub use scheduler::{BlockReport, EngineState, PlaybackScheduler};

type SharedBuffer = Shared<StereoBuffer>;
type OwnedResynth = Owned<Resynthesizer>;

const BUFFER_RING_CAPACITY: usize = 4;
const RESYNTH_RING_CAPACITY: usize = 4;

/// Control-side end of the engine plumbing.
pub struct AudioEngineHandle {
    pub commands: rtrb::Producer<Command>,
    pub status: rtrb::Consumer<Status>,
    pub buffers: rtrb::Producer<SharedBuffer>,
    pub resynths: rtrb::Producer<OwnedResynth>,
    pub collector: Collector,
    pub handle: Handle,
    /// Rate the render step runs at; sounds must be loaded at this rate.
    pub sample_rate: u32,
    _stream: Option<cpal::Stream>,
}

impl AudioEngineHandle {
    pub fn is_headless(&self) -> bool {
        self._stream.is_none()
    }

    /// Queue `sound` for installation, in order with the commands around it.
    ///
    /// Returns `false`, leaving both rings untouched, if either is full.
    pub fn send_buffer(&mut self, sound: StereoBuffer) -> bool {
        if self.commands.is_full() {
            return false;
        }
        if self.buffers.push(Shared::new(&self.handle, sound)).is_err() {
            return false;
        }
        self.commands.push(Command::InstallBuffer).is_ok()
    }
}

/// Open the default output device and start rendering.
pub fn start(config: &EngineConfig) -> anyhow::Result<AudioEngineHandle> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device found"))?;
    debug!(device = ?device.name().ok(), "using output device");

    let supported = choose_stream_config(&device, config)?;
    let sample_format = supported.sample_format();
    let mut stream_config: cpal::StreamConfig = supported.config();
    stream_config.buffer_size = choose_buffer_size(supported.buffer_size(), config.block_frames);

    let sample_rate = stream_config.sample_rate.0;
    let scheduler = PlaybackScheduler::with_filters(sample_rate, config);
    let (mut handle, endpoint) = plumbing(config, scheduler, sample_rate);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, endpoint)?,
        sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
    };
    stream.play()?;

    info!(
        sample_rate,
        channels = stream_config.channels,
        buffer_size = ?stream_config.buffer_size,
        "audio stream started"
    );

    handle._stream = Some(stream);
    Ok(handle)
}

/// Engine plumbing without a device, using a `FilterStage` per channel.
pub fn headless(config: &EngineConfig) -> (AudioEngineHandle, RenderEndpoint) {
    let scheduler = PlaybackScheduler::with_filters(config.sample_rate, config);
    plumbing(config, scheduler, config.sample_rate)
}

/// Engine plumbing without a device, with caller-supplied effects stages.
pub fn headless_with_effects(
    config: &EngineConfig,
    effects: [Box<dyn EffectsStage>; 2],
) -> (AudioEngineHandle, RenderEndpoint) {
    plumbing(config, PlaybackScheduler::new(effects), config.sample_rate)
}

fn plumbing(
    config: &EngineConfig,
    scheduler: PlaybackScheduler,
    sample_rate: u32,
) -> (AudioEngineHandle, RenderEndpoint) {
    let collector = Collector::new();
    let handle = collector.handle();

    let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(config.command_capacity);
    let (status_tx, status_rx) = rtrb::RingBuffer::<Status>::new(config.status_capacity);
    let (buffers_tx, buffers_rx) = rtrb::RingBuffer::<SharedBuffer>::new(BUFFER_RING_CAPACITY);
    let (resynths_tx, resynths_rx) = rtrb::RingBuffer::<OwnedResynth>::new(RESYNTH_RING_CAPACITY);

    let endpoint = RenderEndpoint::new(scheduler, command_rx, buffers_rx, resynths_rx, status_tx);
    let engine = AudioEngineHandle {
        commands: command_tx,
        status: status_rx,
        buffers: buffers_tx,
        resynths: resynths_tx,
        collector,
        handle,
        sample_rate,
        _stream: None,
    };
    (engine, endpoint)
}

/// An f32 config at the preferred rate if the device has one, else its default.
fn choose_stream_config(
    device: &cpal::Device,
    config: &EngineConfig,
) -> anyhow::Result<cpal::SupportedStreamConfig> {
    let preferred = cpal::SampleRate(config.sample_rate);
    let supported = device
        .supported_output_configs()?
        .filter(|range| range.sample_format() == cpal::SampleFormat::F32)
        .find(|range| range.min_sample_rate() <= preferred && preferred <= range.max_sample_rate());

    match supported {
        Some(range) => Ok(range.with_sample_rate(preferred)),
        None => {
            let fallback = device.default_output_config()?;
            warn!(
                preferred = config.sample_rate,
                fallback = fallback.sample_rate().0,
                "preferred sample rate unsupported, using device default"
            );
            Ok(fallback)
        }
    }
}

fn choose_buffer_size(supported: &cpal::SupportedBufferSize, block_frames: u32) -> cpal::BufferSize {
    match supported {
        cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&block_frames) => {
            cpal::BufferSize::Fixed(block_frames)
        }
        _ => {
            debug!(block_frames, "fixed block size unavailable, using device default");
            cpal::BufferSize::Default
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut endpoint: RenderEndpoint,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let output_channels = config.channels as usize;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / output_channels;
            endpoint.process(frames, |i, l, r| {
                let frame = &mut data[i * output_channels..(i + 1) * output_channels];
                write_frame(frame, l, r);
            });
        },
        |err| error!("stream error: {err}"),
        None,
    )?;

    Ok(stream)
}

/// Stereo onto channels 0/1, a mono device gets the average, extras stay silent.
#[inline]
fn write_frame<T: SizedSample + FromSample<f32>>(frame: &mut [T], l: f32, r: f32) {
    match frame {
        [] => {}
        [mono] => *mono = T::from_sample((l + r) / 2.0),
        [left, right, rest @ ..] => {
            *left = T::from_sample(l);
            *right = T::from_sample(r);
            for sample in rest {
                *sample = T::from_sample(0.0);
            }
        }
    }
}
