/// Frames a crossfade takes to go from silent to full gain.
pub const FADE_FRAMES: usize = 512;
pub const FADE_STEP: f32 = 1.0 / FADE_FRAMES as f32;

/// Gain in `[0, 1]` that moves one step per frame toward 0 or 1.
///
/// The step is a power of two, so the ramp lands on exactly 0.0 and 1.0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CrossfadeRamp {
    value: f32,
}

impl CrossfadeRamp {
    pub fn new() -> Self {
        Self { value: 0.0 }
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Move one step toward 1 when `active`, toward 0 otherwise.
    #[inline]
    pub fn step(&mut self, active: bool) -> f32 {
        if active && self.value < 1.0 {
            self.value = (self.value + FADE_STEP).min(1.0);
        } else if !active && self.value > 0.0 {
            self.value = (self.value - FADE_STEP).max(0.0);
        }
        self.value
    }

    #[inline]
    pub fn is_silent(&self) -> bool {
        self.value <= 0.0
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}
