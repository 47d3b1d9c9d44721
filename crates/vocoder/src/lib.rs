//! Pitch-preserving resynthesis of the audio *at* a moving playhead.
//!
//! Each frame is analysed twice, one sample apart, so the per-bin phase
//! velocity comes from the source itself rather than from the distance the
//! playhead travelled. Integrating that velocity over a fixed hop keeps the
//! output at the source pitch for any scrub speed or direction.
//!
//! All FFT work happens on a background worker. The render thread only pops
//! finished stereo frames from a lock-free ring.

use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, Thread};

use rtrb::{Consumer, RingBuffer};
use scrub_transport::StereoBuffer;

mod frame;
mod phase;
mod queue;
mod worker;

pub use frame::{FrameSynthesizer, analysis_starts, hann_window};
pub use phase::{PhaseAccumulator, unwrap};
pub use queue::ResynthesisQueue;
pub use worker::ResynthesisCore;

use worker::WorkerShared;

pub const FFT_SIZE: usize = 2048;
pub const HOP_SIZE: usize = FFT_SIZE / 4;
/// Per-frame gain after the synthesis window.
pub const OUTPUT_GAIN: f32 = 0.25;
/// Produced-but-unplayed samples the worker keeps in hand.
pub const LOOKAHEAD: usize = 2 * FFT_SIZE;
/// Consumed samples each queue may hold before its prefix is dropped.
pub const COMPACTION_THRESHOLD: usize = 4096;

const RING_CAPACITY: usize = 4 * FFT_SIZE;
/// Ring occupancy at which the worker's total lookahead falls below `LOOKAHEAD`.
const WAKE_THRESHOLD: usize = LOOKAHEAD - (FFT_SIZE - HOP_SIZE);

/// Render-side handle to a resynthesis stream.
///
/// Dropping the handle stops the worker and discards whatever it had
/// buffered.
pub struct Resynthesizer {
    frames: Consumer<[f32; 2]>,
    shared: Arc<WorkerShared>,
    worker: Thread,
    /// Set by the first frame popped; the lead-in before it is not an underrun.
    streaming: bool,
    underruns: u32,
}

impl Resynthesizer {
    /// Plan the FFTs and start a worker producing audio at `playhead`.
    ///
    /// Call this from a non-real-time context.
    pub fn spawn(source: StereoBuffer, playhead: usize) -> io::Result<Self> {
        let resynth = Self::spawn_idle(source)?;
        resynth.set_playhead_position(playhead);
        Ok(resynth)
    }

    /// Like `spawn`, but the worker produces nothing until the first
    /// `set_playhead_position`.
    pub fn spawn_idle(source: StereoBuffer) -> io::Result<Self> {
        let (producer, frames) = RingBuffer::new(RING_CAPACITY);
        let shared = Arc::new(WorkerShared::new());
        let core = ResynthesisCore::new(source);

        let handle = thread::Builder::new()
            .name("scrub-resynthesis".into())
            .spawn({
                let shared = Arc::clone(&shared);
                move || worker::run(core, producer, shared)
            })?;

        Ok(Self {
            frames,
            shared,
            worker: handle.thread().clone(),
            streaming: false,
            underruns: 0,
        })
    }

    /// Point the worker at a new playhead. Samples already buffered still
    /// play; the next frames come from `index`.
    pub fn set_playhead_position(&self, index: usize) {
        let moved = self.shared.playhead.swap(index, Ordering::Relaxed) != index;
        let first = !self.shared.positioned.swap(true, Ordering::Release);
        if moved || first {
            self.worker.unpark();
        }
    }

    pub fn playhead_position(&self) -> usize {
        self.shared.playhead.load(Ordering::Relaxed)
    }

    /// Whether the worker has been given a playhead yet.
    pub fn is_positioned(&self) -> bool {
        self.shared.positioned.load(Ordering::Acquire)
    }

    /// Pull exactly one stereo frame. Real-time safe.
    ///
    /// Never waits: if the worker has fallen behind, the frame is silent and
    /// counted as an underrun.
    #[inline]
    pub fn pop_next_sample(&mut self) -> (f32, f32) {
        let frame = match self.frames.pop() {
            Ok([l, r]) => {
                self.streaming = true;
                (l, r)
            }
            Err(_) => {
                if self.streaming {
                    self.underruns = self.underruns.saturating_add(1);
                }
                (0.0, 0.0)
            }
        };

        // One wake per pass; the worker clears the flag when it starts.
        if self.frames.slots() < WAKE_THRESHOLD && !self.shared.wake_requested.load(Ordering::Relaxed) {
            self.shared.wake_requested.store(true, Ordering::Relaxed);
            self.worker.unpark();
        }

        frame
    }

    /// Frames ready to pop without underrunning.
    pub fn available(&self) -> usize {
        self.frames.slots()
    }

    /// Underruns since the last call.
    pub fn take_underruns(&mut self) -> u32 {
        std::mem::take(&mut self.underruns)
    }
}

impl Drop for Resynthesizer {
    fn drop(&mut self) {
        self.shared.released.store(true, Ordering::Release);
        self.worker.unpark();
    }
}

impl std::fmt::Debug for Resynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resynthesizer")
            .field("playhead", &self.playhead_position())
            .field("positioned", &self.is_positioned())
            .field("available", &self.available())
            .field("underruns", &self.underruns)
            .finish()
    }
}
