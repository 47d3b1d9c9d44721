//! Two-offset analysis and resynthesis of one frame.

use std::f32::consts::PI;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::phase::PhaseAccumulator;
use crate::{FFT_SIZE, HOP_SIZE, OUTPUT_GAIN};

/// Periodic Hann window scaled to unit RMS.
///
/// With this scaling the squared window summed at a hop of `len / 4` is
/// exactly 4, which `OUTPUT_GAIN` brings back to unity.
pub fn hann_window(len: usize) -> Vec<f32> {
    let scale = (8.0f32 / 3.0).sqrt();
    (0..len)
        .map(|i| scale * 0.5 * (1.0 - (2.0 * PI * i as f32 / len as f32).cos()))
        .collect()
}

/// Start indices of the two analysis windows for `playhead`, or `None`
/// when clamping to the buffer collapses them onto the same start.
///
/// Window A starts one sample before the playhead and window B at the
/// playhead; both are clamped so a full window fits in the source.
pub fn analysis_starts(playhead: usize, source_len: usize, window: usize) -> Option<(usize, usize)> {
    if source_len <= window {
        return None;
    }
    let last_start = source_len - window - 1;
    let start_a = playhead.saturating_sub(1).min(last_start);
    let start_b = playhead.min(last_start);
    (start_a != start_b).then_some((start_a, start_b))
}

/// Reusable FFT plans and scratch space for synthesizing frames.
///
/// Nothing here allocates after construction; a single instance serves
/// both channels, each bringing its own phase accumulator.
pub struct FrameSynthesizer {
    window: Vec<f32>,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    time_a: Vec<f32>,
    time_b: Vec<f32>,
    spectrum_a: Vec<Complex<f32>>,
    spectrum_b: Vec<Complex<f32>>,
    forward_scratch: Vec<Complex<f32>>,
    inverse_scratch: Vec<Complex<f32>>,
    frame: Vec<f32>,
}

impl FrameSynthesizer {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(FFT_SIZE);
        let inverse = planner.plan_fft_inverse(FFT_SIZE);

        Self {
            window: hann_window(FFT_SIZE),
            time_a: forward.make_input_vec(),
            time_b: forward.make_input_vec(),
            spectrum_a: forward.make_output_vec(),
            spectrum_b: forward.make_output_vec(),
            forward_scratch: forward.make_scratch_vec(),
            inverse_scratch: inverse.make_scratch_vec(),
            frame: inverse.make_output_vec(),
            forward,
            inverse,
        }
    }

    /// Number of bins a phase accumulator needs (DC through Nyquist).
    pub fn bins(&self) -> usize {
        FFT_SIZE / 2 + 1
    }

    /// Synthesize the frame representing `source` at `playhead`.
    ///
    /// Returns a zero frame, leaving `phases` untouched, when the playhead
    /// is too close to either end of the source for the two-offset analysis.
    pub fn synthesize(&mut self, source: &[f32], playhead: usize, phases: &mut PhaseAccumulator) -> &[f32] {
        let Some((start_a, start_b)) = analysis_starts(playhead, source.len(), FFT_SIZE) else {
            self.frame.fill(0.0);
            return &self.frame;
        };

        window_into(&mut self.time_a, &source[start_a..start_a + FFT_SIZE], &self.window);
        window_into(&mut self.time_b, &source[start_b..start_b + FFT_SIZE], &self.window);

        // Lengths all come from the plans, so these cannot fail.
        let _ = self
            .forward
            .process_with_scratch(&mut self.time_a, &mut self.spectrum_a, &mut self.forward_scratch);
        let _ = self
            .forward
            .process_with_scratch(&mut self.time_b, &mut self.spectrum_b, &mut self.forward_scratch);

        for (bin, (a, b)) in self.spectrum_a.iter().zip(self.spectrum_b.iter_mut()).enumerate() {
            let (magnitude, phase_b) = b.to_polar();
            let phase = phases.advance(bin, a.arg(), phase_b, HOP_SIZE);
            *b = Complex::from_polar(magnitude, phase);
        }

        // DC and Nyquist must be real for the inverse real transform.
        let nyquist = self.spectrum_b.len() - 1;
        self.spectrum_b[0].im = 0.0;
        self.spectrum_b[nyquist].im = 0.0;

        let _ = self
            .inverse
            .process_with_scratch(&mut self.spectrum_b, &mut self.frame, &mut self.inverse_scratch);

        let norm = OUTPUT_GAIN / FFT_SIZE as f32;
        for (sample, &w) in self.frame.iter_mut().zip(&self.window) {
            *sample *= w * norm;
        }

        &self.frame
    }
}

impl Default for FrameSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

fn window_into(dst: &mut [f32], src: &[f32], window: &[f32]) {
    for ((d, &s), &w) in dst.iter_mut().zip(src).zip(window) {
        *d = s * w;
    }
}
