//! Per-channel filter/pitch stage the render step feeds every sample through.

use std::f64::consts::PI;

/// Mono sample processor with filter and pitch controls.
///
/// One instance runs per output channel. Setters are called on the render
/// thread between blocks, so implementations must not allocate or block in
/// any method.
pub trait EffectsStage: Send {
    fn set_low_pass_freq(&mut self, hz: f32);
    fn set_high_pass_freq(&mut self, hz: f32);
    fn set_pitch_shift(&mut self, ratio: f32);
    fn process(&mut self, sample: f32) -> f32;
}

/// Identity stage. Records the parameters it was given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Passthrough {
    pub low_pass_hz: f32,
    pub high_pass_hz: f32,
    pub pitch_ratio: f32,
}

impl Default for Passthrough {
    fn default() -> Self {
        Self {
            low_pass_hz: DEFAULT_LOW_PASS_HZ,
            high_pass_hz: DEFAULT_HIGH_PASS_HZ,
            pitch_ratio: 1.0,
        }
    }
}

impl EffectsStage for Passthrough {
    fn set_low_pass_freq(&mut self, hz: f32) {
        self.low_pass_hz = hz;
    }

    fn set_high_pass_freq(&mut self, hz: f32) {
        self.high_pass_hz = hz;
    }

    fn set_pitch_shift(&mut self, ratio: f32) {
        self.pitch_ratio = ratio;
    }

    #[inline]
    fn process(&mut self, sample: f32) -> f32 {
        sample
    }
}

pub const DEFAULT_LOW_PASS_HZ: f32 = 20_000.0;
pub const DEFAULT_HIGH_PASS_HZ: f32 = 10.0;

const MIN_CUTOFF_HZ: f64 = 10.0;
const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;
/// Time constant of the high-pass cutoff glide.
const GLIDE_SECS: f64 = 0.02;
/// Samples between coefficient updates while the cutoff glides.
const GLIDE_UPDATE_INTERVAL: u32 = 32;

#[derive(Debug, Clone, Copy, Default)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    fn lowpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            b0: (1.0 - cos_omega) / 2.0 / a0,
            b1: (1.0 - cos_omega) / a0,
            b2: (1.0 - cos_omega) / 2.0 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn highpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            b0: (1.0 + cos_omega) / 2.0 / a0,
            b1: -(1.0 + cos_omega) / a0,
            b2: (1.0 + cos_omega) / 2.0 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
        }
    }
}

/// Transposed direct form II section.
#[derive(Debug, Clone, Copy, Default)]
struct Biquad {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
}

impl Biquad {
    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let c = &self.coeffs;
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        output
    }
}

/// Low-pass into two cascaded high-pass sections.
///
/// The high-pass cutoff glides toward its target so dragging the filter
/// range does not click; the low-pass cutoff changes immediately. The pitch
/// ratio is stored for the caller but does not alter the signal here.
#[derive(Debug, Clone)]
pub struct FilterStage {
    sample_rate: f64,
    low_pass: Biquad,
    high_pass: [Biquad; 2],
    high_pass_target: f64,
    high_pass_current: f64,
    glide_coeff: f64,
    glide_countdown: u32,
    pitch_ratio: f32,
}

impl FilterStage {
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f64;
        let mut stage = Self {
            sample_rate,
            low_pass: Biquad::default(),
            high_pass: [Biquad::default(); 2],
            high_pass_target: DEFAULT_HIGH_PASS_HZ as f64,
            high_pass_current: DEFAULT_HIGH_PASS_HZ as f64,
            glide_coeff: (-1.0 / (GLIDE_SECS * sample_rate)).exp(),
            glide_countdown: 0,
            pitch_ratio: 1.0,
        };
        stage.set_low_pass_freq(DEFAULT_LOW_PASS_HZ);
        stage.update_high_pass();
        stage
    }

    pub fn pitch_ratio(&self) -> f32 {
        self.pitch_ratio
    }

    pub fn high_pass_cutoff(&self) -> f32 {
        self.high_pass_current as f32
    }

    fn clamp_cutoff(&self, hz: f32) -> f64 {
        (hz as f64).clamp(MIN_CUTOFF_HZ, self.sample_rate * 0.45)
    }

    fn update_high_pass(&mut self) {
        let coeffs = BiquadCoeffs::highpass(self.high_pass_current, BUTTERWORTH_Q, self.sample_rate);
        for section in &mut self.high_pass {
            section.coeffs = coeffs;
        }
    }

    #[inline]
    fn glide(&mut self) {
        if self.high_pass_current == self.high_pass_target {
            return;
        }

        let c = self.glide_coeff;
        self.high_pass_current = self.high_pass_target + (self.high_pass_current - self.high_pass_target) * c;
        if (self.high_pass_current - self.high_pass_target).abs() < 0.01 {
            self.high_pass_current = self.high_pass_target;
        }

        if self.glide_countdown == 0 || self.high_pass_current == self.high_pass_target {
            self.update_high_pass();
            self.glide_countdown = GLIDE_UPDATE_INTERVAL;
        }
        self.glide_countdown -= 1;
    }
}

impl EffectsStage for FilterStage {
    fn set_low_pass_freq(&mut self, hz: f32) {
        let freq = self.clamp_cutoff(hz);
        self.low_pass.coeffs = BiquadCoeffs::lowpass(freq, BUTTERWORTH_Q, self.sample_rate);
    }

    fn set_high_pass_freq(&mut self, hz: f32) {
        self.high_pass_target = self.clamp_cutoff(hz);
    }

    fn set_pitch_shift(&mut self, ratio: f32) {
        self.pitch_ratio = ratio;
    }

    #[inline]
    fn process(&mut self, sample: f32) -> f32 {
        self.glide();
        let x = self.low_pass.process(sample as f64);
        let x = self.high_pass[0].process(x);
        self.high_pass[1].process(x) as f32
    }
}
