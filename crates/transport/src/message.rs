use crate::{ChannelMode, LoopRange};

/// Control-side requests, applied by the render thread at the start of a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Stop,
    /// Move the scrub target to a fraction of the buffer length.
    Scrub { progress: f32 },
    SetScrubbing(bool),
    /// Relative jump in frames.
    Seek { offset: i64 },
    SetLoopRange(Option<LoopRange>),
    SetLooping(bool),
    SetFilterRange { low_hz: f32, high_hz: f32 },
    /// Pitch ratio for the per-channel effects stage.
    SetPitchShift { ratio: f32 },
    SetChannelMode(ChannelMode),
    /// Drop the sound and return every transport field to its initial value.
    Reset,
    /// Install the next sound waiting in the buffer ring.
    InstallBuffer,
}

/// Render-side notifications, drained by the control surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Status {
    /// Playhead as a fraction of the buffer length.
    Progress(f32),
    /// Transport stopped because of a scrub gesture or the end of the sound.
    ScrubPaused,
    /// Scrubbing is active but the render thread holds no resynthesizer.
    ResynthesizerRequested,
    /// The render thread let go of its resynthesizer after the scrub fade-out.
    ResynthesizerReleased,
    /// Frames rendered as silence because the resynthesis stream ran dry.
    Underrun(u32),
}
