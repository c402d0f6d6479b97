use std::{fs, path::Path};

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::{
    model::{Config, Track},
    render::{RenderedAudio, render},
    samples::SampleLoader,
};

/// Renders `tracks` and writes the sequence to a `.wav` file.
#[instrument(skip(tracks, loader), fields(path = %path.display(), tracks = tracks.len()))]
pub fn save_sound(
    path: &Path,
    tracks: &[Track],
    config: &Config,
    loader: &impl SampleLoader,
) -> Result<RenderedAudio> {
    if !has_extension(path, "wav") {
        return Err(anyhow::anyhow!(
            "sound export path must end with .wav: {}",
            path.display()
        ));
    }

    let rendered = render(tracks, config, loader).context("failed to render sequence")?;
    write_wav(path, &rendered)?;
    Ok(rendered)
}

/// Writes rendered audio as a 32-bit float WAV file.
#[instrument(skip(audio), fields(path = %path.display(), frames = audio.frames()))]
pub fn write_wav(path: &Path, audio: &RenderedAudio) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create wav output directory: {}",
                parent.display()
            )
        })?;
    }

    let spec = hound::WavSpec {
        channels: audio.channels.max(1),
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create wav file: {}", path.display()))?;
    for sample in &audio.samples {
        writer
            .write_sample(*sample)
            .context("failed to write wav sample")?;
    }

    writer.finalize().context("failed to finalize wav file")?;
    info!("wav export completed");
    Ok(())
}

pub(crate) fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .is_some_and(|value| value.eq_ignore_ascii_case(extension))
}
