/// Transport-rate and pitch unit that sits after the render step.
///
/// Rate changes playback speed without changing pitch; pitch is in cents.
pub trait TimePitchUnit: Send {
    fn rate(&self) -> f32;
    fn set_rate(&mut self, rate: f32);
    fn pitch_cents(&self) -> f32;
    fn set_pitch_cents(&mut self, cents: f32);
}

pub const MIN_RATE: f32 = 1.0 / 32.0;
pub const MAX_RATE: f32 = 32.0;
pub const MAX_PITCH_CENTS: f32 = 2400.0;

/// Records rate and pitch without processing audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedTimePitch {
    rate: f32,
    pitch_cents: f32,
}

impl Default for FixedTimePitch {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch_cents: 0.0,
        }
    }
}

impl TimePitchUnit for FixedTimePitch {
    fn rate(&self) -> f32 {
        self.rate
    }

    fn set_rate(&mut self, rate: f32) {
        self.rate = rate.clamp(MIN_RATE, MAX_RATE);
    }

    fn pitch_cents(&self) -> f32 {
        self.pitch_cents
    }

    fn set_pitch_cents(&mut self, cents: f32) {
        self.pitch_cents = cents.clamp(-MAX_PITCH_CENTS, MAX_PITCH_CENTS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_are_clamped() {
        let mut unit = FixedTimePitch::default();
        unit.set_rate(100.0);
        unit.set_pitch_cents(-5000.0);
        assert_eq!(unit.rate(), MAX_RATE);
        assert_eq!(unit.pitch_cents(), -MAX_PITCH_CENTS);

        unit.set_rate(0.5);
        assert_eq!(unit.rate(), 0.5);
    }
}
