//! Background buffering: keeps the resynthesis stream ahead of the render thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use rtrb::Producer;
use scrub_transport::{SoundChannel, StereoBuffer};
use tracing::{debug, trace};

use crate::frame::FrameSynthesizer;
use crate::phase::PhaseAccumulator;
use crate::queue::ResynthesisQueue;
use crate::{FFT_SIZE, HOP_SIZE, LOOKAHEAD};

const IDLE_PARK: Duration = Duration::from_millis(50);

/// State shared between a `Resynthesizer` handle and its worker thread.
#[derive(Debug, Default)]
pub(crate) struct WorkerShared {
    pub(crate) playhead: AtomicUsize,
    /// `playhead` has been set at least once.
    pub(crate) positioned: AtomicBool,
    /// The render side unparked the worker and has not been served yet.
    pub(crate) wake_requested: AtomicBool,
    pub(crate) released: AtomicBool,
}

impl WorkerShared {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

struct ChannelState {
    channel: SoundChannel,
    queue: ResynthesisQueue,
    phases: PhaseAccumulator,
}

/// The phase-vocoder pipeline for both channels, independent of any thread.
///
/// The worker thread drives one of these; tests and offline tools can
/// drive it directly.
pub struct ResynthesisCore {
    source: StereoBuffer,
    synth: FrameSynthesizer,
    channels: [ChannelState; 2],
}

impl ResynthesisCore {
    pub fn new(source: StereoBuffer) -> Self {
        let synth = FrameSynthesizer::new();
        let bins = synth.bins();
        let channel = |channel| ChannelState {
            channel,
            queue: ResynthesisQueue::new(FFT_SIZE, HOP_SIZE),
            phases: PhaseAccumulator::new(bins),
        };

        Self {
            source,
            synth,
            channels: [channel(SoundChannel::Left), channel(SoundChannel::Right)],
        }
    }

    pub fn source(&self) -> &StereoBuffer {
        &self.source
    }

    /// Produced-but-unconsumed samples, taking the lower of the two channels.
    pub fn pending(&self) -> usize {
        self.channels
            .iter()
            .map(|c| c.queue.pending())
            .min()
            .unwrap_or(0)
    }

    /// Finalized samples available on both channels.
    pub fn ready(&self) -> usize {
        self.channels
            .iter()
            .map(|c| c.queue.ready())
            .min()
            .unwrap_or(0)
    }

    /// Synthesize one frame per channel at `playhead` and overlap-add it.
    pub fn render_hop(&mut self, playhead: usize) {
        let source = &self.source;
        for state in self.channels.iter_mut() {
            let frame = self
                .synth
                .synthesize(source.channel(state.channel), playhead, &mut state.phases);
            state.queue.overlap_add(frame);
        }
    }

    /// Render hops until `published` plus pending samples reach the lookahead.
    ///
    /// Returns the number of hops rendered.
    pub fn fill(&mut self, playhead: usize, published: usize) -> usize {
        let mut hops = 0;
        while published + self.pending() < LOOKAHEAD {
            self.render_hop(playhead);
            hops += 1;
        }
        hops
    }

    /// Hand up to `max` finalized stereo frames to `sink`.
    pub fn drain_ready(&mut self, max: usize, mut sink: impl FnMut(f32, f32)) -> usize {
        let n = max.min(self.ready());
        let [left, right] = &mut self.channels;
        let l = left.queue.consume(n);
        let r = right.queue.consume(n);
        for (&l, &r) in l.iter().zip(r) {
            sink(l, r);
        }
        n
    }

    /// Drop consumed prefixes once both channels are past the threshold.
    pub fn compact_if_needed(&mut self) -> bool {
        if self.channels.iter().all(|c| c.queue.should_compact()) {
            for state in self.channels.iter_mut() {
                state.queue.compact();
            }
            true
        } else {
            false
        }
    }
}

pub(crate) fn run(mut core: ResynthesisCore, mut producer: Producer<[f32; 2]>, shared: Arc<WorkerShared>) {
    debug!(frames = core.source().frames(), "resynthesis worker started");

    while !shared.released.load(Ordering::Acquire) && !producer.is_abandoned() {
        if shared.positioned.load(Ordering::Acquire) {
            shared.wake_requested.store(false, Ordering::Relaxed);
            buffer_pass(&mut core, &mut producer, &shared);
        }
        thread::park_timeout(IDLE_PARK);
    }

    debug!("resynthesis worker stopped");
}

/// One buffering pass: top the ring up to the lookahead, then compact.
fn buffer_pass(core: &mut ResynthesisCore, producer: &mut Producer<[f32; 2]>, shared: &WorkerShared) {
    let capacity = producer.buffer().capacity();
    let mut hops = 0usize;

    loop {
        let published = capacity - producer.slots();
        if published + core.pending() >= LOOKAHEAD {
            break;
        }

        core.render_hop(shared.playhead.load(Ordering::Relaxed));
        hops += 1;

        let free = producer.slots();
        core.drain_ready(free, |l, r| {
            let _ = producer.push([l, r]);
        });
    }

    if core.compact_if_needed() {
        trace!(hops, "compacted resynthesis queues");
    } else if hops > 0 {
        trace!(hops, "buffering pass");
    }
}
