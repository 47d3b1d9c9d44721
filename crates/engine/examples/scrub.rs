//! Play a file for a moment, then sweep the scrub position back and forth.
//!
//! `cargo run -p scrub_engine --example scrub -- path/to/sound.wav`

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use basedrop::Owned;
use scrub_engine::{AudioEngineHandle, EngineConfig};
use scrub_transport::{Command, Status};
use scrub_vocoder::Resynthesizer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn send(engine: &mut AudioEngineHandle, command: Command) {
    if engine.commands.push(command).is_err() {
        warn!(?command, "command ring full");
    }
}

fn drain(engine: &mut AudioEngineHandle) {
    while let Ok(status) = engine.status.pop() {
        match status {
            Status::Progress(_) => {}
            other => info!(?other, "status"),
        }
    }
    engine.collector.collect();
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let path: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("usage: scrub <audio file>"))?;

    let mut engine = scrub_engine::start(&EngineConfig::default())?;
    let sound = scrub_decode::load_sound(&path, engine.sample_rate)?;

    if !engine.send_buffer(sound.clone()) {
        anyhow::bail!("control rings full");
    }
    send(&mut engine, Command::Play);
    thread::sleep(Duration::from_secs(2));
    drain(&mut engine);

    let resynth = Resynthesizer::spawn(sound, 0)?;
    if engine.resynths.push(Owned::new(&engine.handle, resynth)).is_err() {
        anyhow::bail!("resynthesizer ring full");
    }
    send(&mut engine, Command::SetScrubbing(true));

    // Triangle sweep over the middle of the sound, very slowly.
    for step in 0..=400 {
        let phase = step as f32 / 200.0;
        let progress = 0.3 + 0.1 * if phase <= 1.0 { phase } else { 2.0 - phase };
        send(&mut engine, Command::Scrub { progress });
        thread::sleep(Duration::from_millis(20));
        drain(&mut engine);
    }

    send(&mut engine, Command::SetScrubbing(false));
    thread::sleep(Duration::from_millis(200));
    drain(&mut engine);

    Ok(())
}
