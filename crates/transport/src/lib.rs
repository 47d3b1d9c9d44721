use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

mod channel;
mod message;

pub use channel::{ChannelMode, LoopRange, TransportState};
pub use message::{Command, Status};

/// Sample rate the engine runs at unless the output device dictates otherwise.
pub const ENGINE_SAMPLE_RATE: u32 = 44_100;

/// Per-channel pitch ratio for a shift of `semitones` plus `cents`.
pub fn pitch_ratio(semitones: f32, cents: f32) -> f32 {
    2f32.powf((semitones + cents / 100.0) / 12.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundChannel {
    Left,
    Right,
}

/// Shared, immutable stereo sample data.
///
/// `StereoBuffer` keeps the left and right channels in separate
/// reference-counted slices, so cloning only bumps two refcounts and the
/// render thread, the resynthesis worker and the control side can all hold
/// the same decoded sound for the lifetime of a session.
///
/// # Memory Layout
///
/// ```text
/// StereoBuffer
/// ├─ left:  Arc<[f32]> ────> Heap: [f32; frames]
/// ├─ right: Arc<[f32]> ────> Heap: [f32; frames]
/// └─ sample_rate: u32
/// ```
///
/// # Examples
///
/// ```
/// use scrub_transport::StereoBuffer;
///
/// let buffer = StereoBuffer::new(vec![0.0, 0.5], vec![1.0, 1.5], 44100);
/// let copy = buffer.clone();
/// assert_eq!(copy.frames(), 2);
/// assert_eq!(buffer.frame(1), (0.5, 1.5));
/// ```
#[derive(Clone)]
pub struct StereoBuffer {
    left: Arc<[f32]>,
    right: Arc<[f32]>,
    /// Sample rate in Hz (e.g., 44100, 48000)
    sample_rate: u32,
}

impl StereoBuffer {
    /// Create a new `StereoBuffer` from owned channel data.
    ///
    /// # Panics
    ///
    /// Panics if the two channels differ in length.
    pub fn new(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Self {
        assert_eq!(left.len(), right.len(), "channel lengths must match");
        Self {
            left: Arc::from(left),
            right: Arc::from(right),
            sample_rate,
        }
    }

    /// Build a stereo buffer from interleaved samples.
    ///
    /// Mono input is duplicated to both channels. Input with more than two
    /// channels keeps the first two.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is 0 or if `samples.len()` is not divisible by `channels`.
    ///
    /// # Examples
    ///
    /// ```
    /// use scrub_transport::StereoBuffer;
    ///
    /// let mono = StereoBuffer::from_interleaved(&[0.25, 0.5], 44100, 1);
    /// assert_eq!(mono.left(), mono.right());
    ///
    /// let stereo = StereoBuffer::from_interleaved(&[0.0, 1.0, 0.5, 1.5], 44100, 2);
    /// assert_eq!(stereo.right(), &[1.0, 1.5]);
    /// ```
    pub fn from_interleaved(samples: &[f32], sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        let channels = channels as usize;
        assert_eq!(
            samples.len() % channels,
            0,
            "samples.len() must be divisible by channels"
        );

        let left: Vec<f32> = samples.chunks_exact(channels).map(|f| f[0]).collect();
        let right: Vec<f32> = if channels == 1 {
            left.clone()
        } else {
            samples.chunks_exact(channels).map(|f| f[1]).collect()
        };

        Self::new(left, right, sample_rate)
    }

    /// A zero-length buffer, used where a sound has not been loaded yet.
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), Vec::new(), sample_rate)
    }

    #[inline]
    pub fn left(&self) -> &[f32] {
        &self.left
    }

    #[inline]
    pub fn right(&self) -> &[f32] {
        &self.right
    }

    #[inline]
    pub fn channel(&self, channel: SoundChannel) -> &[f32] {
        match channel {
            SoundChannel::Left => &self.left,
            SoundChannel::Right => &self.right,
        }
    }

    /// The `(L, R)` pair at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.frames()`.
    #[inline]
    pub fn frame(&self, index: usize) -> (f32, f32) {
        (self.left[index], self.right[index])
    }

    /// Get the sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of stereo frames.
    #[inline]
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Get the duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Get a reference to the inner left `Arc<[f32]>`, mostly useful for
    /// checking that clones share storage.
    pub fn left_arc(&self) -> &Arc<[f32]> {
        &self.left
    }

    /// Interleave both channels as `[L, R, L, R, ...]`.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut samples = Vec::with_capacity(self.frames() * 2);
        for (&l, &r) in self.left.iter().zip(self.right.iter()) {
            samples.push(l);
            samples.push(r);
        }
        samples
    }

    /// Resample to a target sample rate.
    ///
    /// If the audio is already at the target rate, returns a clone (cheap refcount bump).
    /// Otherwise, performs high-quality sinc interpolation resampling.
    ///
    /// # Errors
    ///
    /// Returns an error if resampling fails (e.g., invalid parameters).
    pub fn resample(&self, target_sample_rate: u32) -> anyhow::Result<Self> {
        if self.sample_rate == target_sample_rate || self.is_empty() {
            return Ok(Self {
                sample_rate: target_sample_rate,
                ..self.clone()
            });
        }

        resample_stereo(self, target_sample_rate)
    }
}

impl std::fmt::Debug for StereoBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StereoBuffer")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("duration_secs", &self.duration_secs())
            .finish()
    }
}

fn resample_stereo(buffer: &StereoBuffer, target_sample_rate: u32) -> anyhow::Result<StereoBuffer> {
    let input_frames = buffer.frames();
    let resample_ratio = target_sample_rate as f64 / buffer.sample_rate as f64;

    let input_channels = vec![buffer.left.to_vec(), buffer.right.to_vec()];

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(resample_ratio, 2.0, params, input_frames, 2)?;
    let mut output_channels = resampler.process(&input_channels, None)?;

    let right = output_channels.pop().unwrap_or_default();
    let left = output_channels.pop().unwrap_or_default();

    Ok(StereoBuffer::new(left, right, target_sample_rate))
}
