use serde::{Deserialize, Serialize};

/// How the processed stereo pair is routed to the two physical outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    #[default]
    Lr,
    Rl,
    L,
    R,
    Mono,
}

impl ChannelMode {
    pub const ALL: [ChannelMode; 5] = [
        ChannelMode::Lr,
        ChannelMode::Rl,
        ChannelMode::L,
        ChannelMode::R,
        ChannelMode::Mono,
    ];

    /// The mode after this one, wrapping back to `Lr`.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ChannelMode::Lr => "L・R",
            ChannelMode::Rl => "R・L",
            ChannelMode::L => "L",
            ChannelMode::R => "R",
            ChannelMode::Mono => "MONO",
        }
    }

    /// Map a processed `(l, r)` pair onto the physical `(left, right)` outputs.
    #[inline]
    pub fn remap(self, l: f32, r: f32) -> (f32, f32) {
        match self {
            ChannelMode::Lr => (l, r),
            ChannelMode::Rl => (r, l),
            ChannelMode::L => (l, l),
            ChannelMode::R => (r, r),
            ChannelMode::Mono => {
                let mid = (l + r) / 2.0;
                (mid, mid)
            }
        }
    }
}

/// Closed interval of frame indices the transport wraps within while looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRange {
    pub start: usize,
    pub end: usize,
}

impl LoopRange {
    /// Build a range, swapping the bounds if they arrive reversed.
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Convert fractions of the buffer length into frame indices.
    pub fn from_progress(lower: f32, upper: f32, frames: usize) -> Self {
        let to_frame = |p: f32| (p.clamp(0.0, 1.0) * frames as f32) as usize;
        Self::new(to_frame(lower), to_frame(upper))
    }

    pub fn contains(&self, frame: usize) -> bool {
        frame >= self.start && frame <= self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// What the engine is doing from the control surface's point of view.
///
/// `Frozen` is `Scrubbing` with transport playback disabled and the
/// resynthesized stream pinned at the current playhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Scrubbing,
    Frozen,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    pub fn is_scrubbing(&self) -> bool {
        matches!(self, TransportState::Scrubbing | TransportState::Frozen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_is_exact_average() {
        let pairs = [(0.1f32, 0.7f32), (-1.0, 1.0), (0.333, 0.25), (1e-7, -3e-7)];
        for (l, r) in pairs {
            let (out_l, out_r) = ChannelMode::Mono.remap(l, r);
            assert_eq!(out_l, (l + r) / 2.0);
            assert_eq!(out_r, (l + r) / 2.0);
        }
    }

    #[test]
    fn test_remap_modes() {
        assert_eq!(ChannelMode::Lr.remap(1.0, 2.0), (1.0, 2.0));
        assert_eq!(ChannelMode::Rl.remap(1.0, 2.0), (2.0, 1.0));
        assert_eq!(ChannelMode::L.remap(1.0, 2.0), (1.0, 1.0));
        assert_eq!(ChannelMode::R.remap(1.0, 2.0), (2.0, 2.0));
    }

    #[test]
    fn test_next_cycles_through_all_modes() {
        let mut mode = ChannelMode::Lr;
        let mut seen = Vec::new();
        for _ in 0..ChannelMode::ALL.len() {
            seen.push(mode);
            mode = mode.next();
        }
        assert_eq!(seen, ChannelMode::ALL);
        assert_eq!(mode, ChannelMode::Lr);
        assert_eq!(ChannelMode::Mono.display_name(), "MONO");
    }

    #[test]
    fn test_loop_range_from_progress() {
        let range = LoopRange::from_progress(0.25, 0.5, 1000);
        assert_eq!(range, LoopRange { start: 250, end: 500 });
        assert!(range.contains(250));
        assert!(range.contains(500));
        assert!(!range.contains(501));
        assert_eq!(range.len(), 251);
    }

    #[test]
    fn test_loop_range_reversed_bounds() {
        assert_eq!(LoopRange::new(10, 2), LoopRange { start: 2, end: 10 });
    }

    #[test]
    fn test_transport_state_flags() {
        assert!(TransportState::Frozen.is_scrubbing());
        assert!(!TransportState::Frozen.is_playing());
        assert!(TransportState::Playing.is_playing());
    }
}
