use std::fs::File;
use std::path::Path;

use anyhow::Context;
use scrub_transport::StereoBuffer;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// Decode `path` and resample it to `sample_rate`, ready for the engine.
pub fn load_sound(path: &Path, sample_rate: u32) -> anyhow::Result<StereoBuffer> {
    let decoded = decode_file(path)?;
    let sound = decoded
        .resample(sample_rate)
        .with_context(|| format!("resampling {} to {sample_rate} Hz", path.display()))?;

    info!(
        path = %path.display(),
        source_rate = decoded.sample_rate(),
        frames = sound.frames(),
        duration_secs = sound.duration_secs(),
        "loaded sound"
    );
    Ok(sound)
}

/// Decode the default track of `path` at its native sample rate.
///
/// Mono is duplicated to both channels; anything wider keeps the first two.
pub fn decode_file(path: &Path) -> anyhow::Result<StereoBuffer> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default track in {}", path.display()))?;

    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => {
                warn!(path = %path.display(), "skipping corrupt packet: {err}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count() as u16);

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let sample_rate = sample_rate.unwrap_or(scrub_transport::ENGINE_SAMPLE_RATE);
    let channels = channels.filter(|&c| c > 0).unwrap_or(2);
    debug!(
        path = %path.display(),
        sample_rate,
        channels,
        samples = samples.len(),
        "decoded file"
    );

    // A truncated final packet can leave a partial frame behind.
    let whole = samples.len() - samples.len() % channels as usize;
    samples.truncate(whole);

    Ok(StereoBuffer::from_interleaved(&samples, sample_rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_wav(dir: &TempDir, name: &str, channels: u16, sample_rate: u32, frames: &[Vec<f32>]) -> PathBuf {
        let path = dir.path().join(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for frame in frames {
            for &sample in frame {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_decode_stereo_wav() {
        let dir = TempDir::new().unwrap();
        let frames: Vec<Vec<f32>> = (0..100).map(|i| vec![i as f32 / 100.0, -(i as f32) / 100.0]).collect();
        let path = write_wav(&dir, "stereo.wav", 2, 44100, &frames);

        let buffer = decode_file(&path).unwrap();

        assert_eq!(buffer.sample_rate(), 44100);
        assert_eq!(buffer.frames(), 100);
        assert_eq!(buffer.frame(50), (0.5, -0.5));
    }

    #[test]
    fn test_mono_is_duplicated() {
        let dir = TempDir::new().unwrap();
        let frames: Vec<Vec<f32>> = (0..64).map(|i| vec![(i as f32 * 0.1).sin()]).collect();
        let path = write_wav(&dir, "mono.wav", 1, 22050, &frames);

        let buffer = decode_file(&path).unwrap();

        assert_eq!(buffer.frames(), 64);
        assert_eq!(buffer.left(), buffer.right());
    }

    #[test]
    fn test_load_sound_resamples_to_engine_rate() {
        let dir = TempDir::new().unwrap();
        let frames: Vec<Vec<f32>> = (0..48000)
            .map(|i| {
                let s = 0.5 * (2.0 * PI * 440.0 * i as f32 / 48000.0).sin();
                vec![s, s]
            })
            .collect();
        let path = write_wav(&dir, "tone.wav", 2, 48000, &frames);

        let sound = load_sound(&path, 44100).unwrap();

        assert_eq!(sound.sample_rate(), 44100);
        assert!((sound.duration_secs() - 1.0).abs() < 0.03, "{}", sound.duration_secs());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = decode_file(Path::new("does/not/exist.wav")).unwrap_err();
        assert!(err.to_string().contains("does/not/exist.wav"));
    }
}
