use std::{
    f32::consts::TAU,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use tracing::{debug, instrument};

use crate::model::{Config, DEFAULT_SAMPLE_RATE, Track};

// fixed seeds keep demo renders reproducible
const SNARE_SEED: u64 = 0x5eed_1234;
const HIHAT_SEED: u64 = 0x0bad_cafe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoKit {
    pub kick: PathBuf,
    pub snare: PathBuf,
    pub hihat: PathBuf,
}

/// Writes a small synthesized drum kit (mono, 16-bit, 44.1 kHz) into `dir`.
#[instrument(fields(dir = %dir.display()))]
pub fn write_demo_kit(dir: &Path) -> Result<DemoKit> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create demo kit directory: {}", dir.display()))?;

    let kit = DemoKit {
        kick: dir.join("kick.wav"),
        snare: dir.join("snare.wav"),
        hihat: dir.join("hihat_closed.wav"),
    };
    write_mono_wav(&kit.kick, &kick(DEFAULT_SAMPLE_RATE))?;
    write_mono_wav(&kit.snare, &snare(DEFAULT_SAMPLE_RATE))?;
    write_mono_wav(&kit.hihat, &hihat(DEFAULT_SAMPLE_RATE))?;

    debug!("demo kit written");
    Ok(kit)
}

/// One bar of kick, snare and eighth-note hi-hats.
#[must_use]
pub fn demo_tracks(kit: &DemoKit) -> Vec<Track> {
    vec![
        Track::new("kick", &kit.kick, vec![0, 12, 30, 36]),
        Track::new("snare", &kit.snare, vec![12, 18, 36]),
        Track::new("hihat", &kit.hihat, vec![0, 6, 12, 18, 24, 30, 36, 42]).with_volume(0.6),
    ]
}

#[must_use]
pub fn demo_config() -> Config {
    Config::new(120, 4, 4)
}

pub fn write_mono_wav(path: &Path, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: DEFAULT_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create wav file: {}", path.display()))?;
    for sample in samples {
        let quantized = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
        writer
            .write_sample(quantized)
            .context("failed to write wav sample")?;
    }
    writer.finalize().context("failed to finalize wav file")?;
    Ok(())
}

fn kick(sample_rate: u32) -> Vec<f32> {
    let rate = sample_rate as f32;
    let frames = (0.35 * rate) as usize;
    let mut phase = 0.0_f32;
    (0..frames)
        .map(|frame| {
            let seconds = frame as f32 / rate;
            let frequency = 50.0 + 100.0 * (-seconds * 30.0).exp();
            phase += TAU * frequency / rate;
            phase.sin() * (-seconds * 9.0).exp()
        })
        .collect()
}

fn snare(sample_rate: u32) -> Vec<f32> {
    let rate = sample_rate as f32;
    let frames = (0.2 * rate) as usize;
    let mut noise = SmallRng::seed_from_u64(SNARE_SEED);
    (0..frames)
        .map(|frame| {
            let seconds = frame as f32 / rate;
            let body = (TAU * 180.0 * seconds).sin() * (-seconds * 25.0).exp();
            let rattle = noise.random_range(-1.0..=1.0_f32) * (-seconds * 18.0).exp();
            0.5 * body + 0.6 * rattle
        })
        .collect()
}

fn hihat(sample_rate: u32) -> Vec<f32> {
    let rate = sample_rate as f32;
    let frames = (0.06 * rate) as usize;
    let mut noise = SmallRng::seed_from_u64(HIHAT_SEED);
    let mut previous = 0.0_f32;
    (0..frames)
        .map(|frame| {
            let seconds = frame as f32 / rate;
            let current = noise.random_range(-1.0..=1.0_f32);
            // first difference pushes the noise towards the top of the spectrum
            let bright = current - previous;
            previous = current;
            0.4 * bright * (-seconds * 70.0).exp()
        })
        .collect()
}
