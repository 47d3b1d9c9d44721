//! Phase wrapping and per-bin phase integration.

use std::f32::consts::{PI, TAU};

/// Wrap a phase value into `[-π, π)`.
#[inline]
pub fn unwrap(phase: f32) -> f32 {
    (phase + PI).rem_euclid(TAU) - PI
}

/// Running phase for every bin of one channel, carried across frames.
///
/// A bin is `None` until the first frame seeds it with the analysed phase.
#[derive(Debug, Clone)]
pub struct PhaseAccumulator {
    phases: Vec<Option<f32>>,
}

impl PhaseAccumulator {
    pub fn new(bins: usize) -> Self {
        Self {
            phases: vec![None; bins],
        }
    }

    pub fn bins(&self) -> usize {
        self.phases.len()
    }

    pub fn is_initialized(&self, bin: usize) -> bool {
        self.phases[bin].is_some()
    }

    pub fn get(&self, bin: usize) -> Option<f32> {
        self.phases[bin]
    }

    /// Advance `bin` by one hop and return the phase to synthesize with.
    ///
    /// `phase_a` and `phase_b` are the bin's phases one sample apart, so
    /// their difference is the per-sample phase velocity; scaling by `hop`
    /// gives the advance over one synthesis hop.
    #[inline]
    pub fn advance(&mut self, bin: usize, phase_a: f32, phase_b: f32, hop: usize) -> f32 {
        let next = match self.phases[bin] {
            None => phase_b,
            Some(acc) => {
                let delta = unwrap((phase_b - phase_a) * hop as f32);
                unwrap(acc + delta)
            }
        };
        self.phases[bin] = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.phases.fill(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    /// Distance on the circle, so -π and π compare equal.
    fn circular_distance(a: f32, b: f32) -> f32 {
        let d = (a - b).abs();
        d.min(TAU - d)
    }

    proptest! {
        #[test]
        fn unwrap_is_invariant_under_full_turns(phase in -20.0f32..20.0, k in -8i32..8) {
            let shifted = unwrap(phase + TAU * k as f32);
            let base = unwrap(phase);
            prop_assert!(circular_distance(shifted, base) < 1e-3,
                "unwrap({}) = {}, shifted by {} turns = {}", phase, base, k, shifted);
        }

        #[test]
        fn unwrap_stays_in_range(phase in -1000.0f32..1000.0) {
            let wrapped = unwrap(phase);
            prop_assert!((-PI..=PI).contains(&wrapped), "{} -> {}", phase, wrapped);
        }
    }

    #[test]
    fn test_unwrap_known_values() {
        assert_abs_diff_eq!(unwrap(0.0), 0.0);
        assert_abs_diff_eq!(unwrap(PI / 2.0), PI / 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(unwrap(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(unwrap(-3.0 * PI / 2.0), PI / 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_first_frame_seeds_with_current_phase() {
        let mut acc = PhaseAccumulator::new(4);
        assert!(!acc.is_initialized(2));

        let phase = acc.advance(2, 0.1, 0.4, 512);

        assert_eq!(phase, 0.4);
        assert!(acc.is_initialized(2));
        assert!(!acc.is_initialized(1));
    }

    #[test]
    fn test_advance_integrates_scaled_delta() {
        let mut acc = PhaseAccumulator::new(1);
        acc.advance(0, 0.0, 0.5, 4);

        // delta = (0.3 - 0.2) * 4 = 0.4
        let phase = acc.advance(0, 0.2, 0.3, 4);
        assert_abs_diff_eq!(phase, 0.9, epsilon = 1e-5);
    }

    #[test]
    fn test_zero_is_a_valid_seed() {
        // A bin seeded with 0.0 must count as initialized.
        let mut acc = PhaseAccumulator::new(1);
        acc.advance(0, 0.0, 0.0, 512);
        assert_eq!(acc.get(0), Some(0.0));

        acc.reset();
        assert_eq!(acc.get(0), None);
    }
}
