use std::{
    collections::BTreeSet,
    fs::File,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open sample {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed sample {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

impl LoadError {
    fn malformed(path: &Path, reason: impl ToString) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Decoded sample data, interleaved by frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    #[must_use]
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: 1,
            samples,
        }
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleEntry {
    pub path: String,
    pub extension: String,
    pub size_bytes: u64,
}

/// Source of sample data for the renderer.
pub trait SampleLoader {
    fn load(&self, path: &Path) -> Result<DecodedAudio, LoadError>;
}

impl<F> SampleLoader for F
where
    F: Fn(&Path) -> Result<DecodedAudio, LoadError>,
{
    fn load(&self, path: &Path) -> Result<DecodedAudio, LoadError> {
        self(path)
    }
}

/// Decodes samples from disk with symphonia, keeping the native rate and
/// channel layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSampleLoader;

impl SampleLoader for FileSampleLoader {
    fn load(&self, path: &Path) -> Result<DecodedAudio, LoadError> {
        decode_audio_file(path)
    }
}

#[instrument(fields(path = %path.display()))]
pub fn decode_audio_file(path: &Path) -> Result<DecodedAudio, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|value| value.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|error| LoadError::malformed(path, error))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| LoadError::malformed(path, "no default audio track"))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|error| LoadError::malformed(path, error))?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map_or(0, |value| value.count() as u16);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                break;
            }
            Err(error) => return Err(LoadError::malformed(path, error)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!(reason, "skipping undecodable packet");
                continue;
            }
            Err(error) => return Err(LoadError::malformed(path, error)),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;
        let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buffer.samples());
    }

    if channels == 0 {
        return Err(LoadError::malformed(path, "unknown channel layout"));
    }

    debug!(
        sample_rate,
        channels,
        total_frames = samples.len() / usize::from(channels),
        "sample decode complete"
    );

    Ok(DecodedAudio {
        sample_rate,
        channels,
        samples,
    })
}

/// Lists decodable audio files under `directory`, sorted by path. A missing
/// directory yields an empty list.
#[instrument(fields(directory = %directory.display()))]
pub fn scan_sample_library(directory: &Path) -> Result<Vec<SampleEntry>> {
    if !directory.exists() {
        debug!("sample library directory missing");
        return Ok(Vec::new());
    }

    if !directory.is_dir() {
        return Err(anyhow::anyhow!(
            "sample library path is not a directory: {}",
            directory.display()
        ));
    }

    let extensions = supported_sample_extensions();
    let mut entries = Vec::new();

    for entry in WalkDir::new(directory).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(?error, "ignoring unreadable entry while scanning samples");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(extension) = entry
            .path()
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase)
        else {
            continue;
        };
        if !extensions.contains(extension.as_str()) {
            continue;
        }

        let size_bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
        entries.push(SampleEntry {
            path: entry.path().display().to_string(),
            extension,
            size_bytes,
        });
    }

    entries.sort_by(|left, right| left.path.cmp(&right.path));
    debug!(count = entries.len(), "sample library scan complete");
    Ok(entries)
}

fn supported_sample_extensions() -> BTreeSet<&'static str> {
    ["wav", "flac", "ogg", "aiff", "aif", "caf"]
        .into_iter()
        .collect()
}
