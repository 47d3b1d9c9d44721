use basedrop::{Owned, Shared};
use rtrb::{Consumer, Producer};
use scrub_transport::{Command, Status, StereoBuffer};
use scrub_vocoder::Resynthesizer;

use crate::scheduler::{BlockReport, PlaybackScheduler};

/// Render-side end of the engine plumbing.
///
/// Owns the scheduler and the receiving ends of the control rings. The
/// hardware callback drives one of these; headless callers (tests, offline
/// render) drive it directly.
pub struct RenderEndpoint {
    scheduler: PlaybackScheduler,
    commands: Consumer<Command>,
    buffers: Consumer<Shared<StereoBuffer>>,
    resynths: Consumer<Owned<Resynthesizer>>,
    status: Producer<Status>,
}

impl RenderEndpoint {
    pub(crate) fn new(
        scheduler: PlaybackScheduler,
        commands: Consumer<Command>,
        buffers: Consumer<Shared<StereoBuffer>>,
        resynths: Consumer<Owned<Resynthesizer>>,
        status: Producer<Status>,
    ) -> Self {
        Self {
            scheduler,
            commands,
            buffers,
            resynths,
            status,
        }
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    /// Apply pending control input, render one block and publish what
    /// happened. Real-time safe.
    pub fn process(&mut self, frames: usize, sink: impl FnMut(usize, f32, f32)) {
        self.drain_control();
        let report = self.scheduler.render(frames, sink);
        self.publish(report);
    }

    /// Render into an interleaved stereo slice.
    pub fn process_interleaved(&mut self, out: &mut [f32]) {
        let frames = out.len() / 2;
        self.process(frames, |i, l, r| {
            out[2 * i] = l;
            out[2 * i + 1] = r;
        });
    }

    // A sound is installed when its `InstallBuffer` marker comes up, so it
    // lands in order with the commands queued around it.
    fn drain_control(&mut self) {
        while let Ok(command) = self.commands.pop() {
            let status = match command {
                Command::InstallBuffer => match self.buffers.pop() {
                    Ok(buffer) => self.scheduler.install_buffer(buffer),
                    Err(_) => None,
                },
                command => self.scheduler.apply(command),
            };
            if let Some(status) = status {
                let _ = self.status.push(status);
            }
        }
        while let Ok(resynth) = self.resynths.pop() {
            self.scheduler.install_resynthesizer(resynth);
        }
    }

    fn publish(&mut self, report: BlockReport) {
        if report.underruns > 0 {
            let _ = self.status.push(Status::Underrun(report.underruns));
        }
        if let Some(progress) = report.progress {
            let _ = self.status.push(Status::Progress(progress));
        }
        if report.scrub_paused {
            let _ = self.status.push(Status::ScrubPaused);
        }
        if report.resynth_released {
            let _ = self.status.push(Status::ResynthesizerReleased);
        }
    }
}
