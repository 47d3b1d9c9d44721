use std::path::Path;

use scrub_engine::RenderEndpoint;
use scrub_transport::StereoBuffer;
use tracing::debug;

/// Drive the render step for `frames` frames in blocks of `block_frames`,
/// as the hardware clock would, and collect the output.
pub fn render_blocks(
    endpoint: &mut RenderEndpoint,
    frames: usize,
    block_frames: usize,
    sample_rate: u32,
) -> StereoBuffer {
    let block_frames = block_frames.max(1);
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);

    let mut remaining = frames;
    while remaining > 0 {
        let block = remaining.min(block_frames);
        endpoint.process(block, |_, l, r| {
            left.push(l);
            right.push(r);
        });
        remaining -= block;
    }

    StereoBuffer::new(left, right, sample_rate)
}

/// Render until transport playback stops (end of sound, or a stop queued
/// by the caller), or `max_frames` have been produced.
///
/// Blocks that finish after the stop are still rendered in full, so the
/// tail is silent padding up to the block boundary.
pub fn render_playback(
    endpoint: &mut RenderEndpoint,
    max_frames: usize,
    block_frames: usize,
    sample_rate: u32,
) -> StereoBuffer {
    let block_frames = block_frames.max(1);
    let mut left = Vec::new();
    let mut right = Vec::new();

    let mut blocks = 0usize;
    while left.len() < max_frames {
        let block = (max_frames - left.len()).min(block_frames);
        endpoint.process(block, |_, l, r| {
            left.push(l);
            right.push(r);
        });
        blocks += 1;

        if !endpoint.scheduler().state().is_playing() {
            break;
        }
    }

    debug!(blocks, frames = left.len(), "offline render finished");
    StereoBuffer::new(left, right, sample_rate)
}

/// Write `buffer` as a two-channel 32-bit float WAV file.
pub fn write_wav(buffer: &StereoBuffer, path: &Path) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;

    for (&l, &r) in buffer.left().iter().zip(buffer.right()) {
        writer.write_sample(l)?;
        writer.write_sample(r)?;
    }

    writer.finalize()?;
    debug!(path = %path.display(), frames = buffer.frames(), "wrote wav");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrub_engine::{EngineConfig, FADE_FRAMES, Passthrough, headless_with_effects};
    use scrub_transport::{ChannelMode, Command};
    use tempfile::TempDir;

    fn passthrough_engine() -> (scrub_engine::AudioEngineHandle, RenderEndpoint) {
        headless_with_effects(
            &EngineConfig::default(),
            [Box::new(Passthrough::default()), Box::new(Passthrough::default())],
        )
    }

    #[test]
    fn test_render_blocks_without_sound_is_silent() {
        let (_engine, mut endpoint) = passthrough_engine();
        let out = render_blocks(&mut endpoint, 1000, 128, 44100);

        assert_eq!(out.frames(), 1000);
        assert!(out.left().iter().chain(out.right()).all(|&s| s == 0.0));
    }

    #[test]
    fn test_render_playback_stops_at_end_of_sound() {
        let (mut engine, mut endpoint) = passthrough_engine();
        let sound = StereoBuffer::new(vec![0.5; 3000], vec![0.25; 3000], 44100);
        assert!(engine.send_buffer(sound));
        assert!(engine.commands.push(Command::SetChannelMode(ChannelMode::Mono)).is_ok());
        assert!(engine.commands.push(Command::Play).is_ok());

        let out = render_playback(&mut endpoint, 1_000_000, 128, 44100);

        // 3000 frames of sound, padded to the next block boundary.
        assert_eq!(out.frames(), 3072);
        assert_eq!(out.frame(FADE_FRAMES), (0.375, 0.375));
        assert_eq!(out.frame(2999), (0.375, 0.375));
        assert!(out.left()[3000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_write_wav_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.wav");
        let buffer = StereoBuffer::new(vec![0.1, 0.2, 0.3], vec![-0.1, -0.2, -0.3], 48000);

        write_wav(&buffer, &path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
    }
}
