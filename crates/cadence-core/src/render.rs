use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::{
    grid::{UNITS_PER_BEAT, pattern_length_beats, samples_per_beat},
    model::{Config, DEFAULT_SAMPLE_RATE, MASTER_VOLUME, Track},
    samples::{DecodedAudio, LoadError, SampleLoader},
};

/// Upper bound on the length of a rendered sequence.
pub const MAX_RENDER_SECONDS: u32 = 60 * 60;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("sample rate mismatch: {rates:?}")]
    SampleRateMismatch { rates: Vec<u32> },
    #[error("sample rate could not be determined for {path:?}")]
    MissingSampleRate { path: PathBuf },
    #[error("samples have different channel counts: {channels:?}")]
    ChannelMismatch { channels: Vec<u16> },
    #[error("sequence of {beats} beats repeated {repeat} times is longer than {max_seconds} seconds")]
    SequenceTooLong {
        beats: u32,
        repeat: u32,
        max_seconds: u32,
    },
}

/// A rendered sequence, interleaved by frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl RenderedAudio {
    fn empty() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            samples: Vec::new(),
        }
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }

        self.frames() as f64 / f64::from(self.sample_rate)
    }

    #[must_use]
    pub fn peak(&self) -> f32 {
        peak(&self.samples)
    }
}

struct LoadedTrack<'a> {
    track: &'a Track,
    path: &'a Path,
    audio: DecodedAudio,
}

/// Mixes every track with a sample into one pattern, normalizes it to
/// [`MASTER_VOLUME`] and tiles it `config.repeat` times.
///
/// Tracks without a sample are skipped. When none are left the result is an
/// empty buffer at [`DEFAULT_SAMPLE_RATE`] and the loader is never called.
#[instrument(skip(tracks, loader), fields(tracks = tracks.len(), bpm = config.bpm, repeat = config.repeat))]
pub fn render(
    tracks: &[Track],
    config: &Config,
    loader: &impl SampleLoader,
) -> Result<RenderedAudio, RenderError> {
    let sounding: Vec<(&Track, &Path)> = tracks
        .iter()
        .filter_map(|track| track.sample_path().map(|path| (track, path)))
        .collect();
    if sounding.is_empty() {
        debug!("no tracks with samples, returning empty render");
        return Ok(RenderedAudio::empty());
    }

    validate_config(config)?;

    let loaded = sounding
        .into_iter()
        .map(|(track, path)| {
            loader.load(path).map(|audio| LoadedTrack { track, path, audio })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let sample_rate = common_sample_rate(&loaded)?;
    let channels = common_channel_count(&loaded)?;
    let channel_count = usize::from(channels);

    let max_timing = loaded
        .iter()
        .map(|loaded| loaded.track.max_timing())
        .max()
        .unwrap_or_default();
    let length_beats = pattern_length_beats(max_timing, config.beats_per_measure);
    let beat_samples = samples_per_beat(config.bpm, sample_rate);
    let unit_samples = beat_samples as f64 / f64::from(UNITS_PER_BEAT);
    let pattern_frames =
        sequence_frames(length_beats, beat_samples, config.repeat, sample_rate, channel_count)
            .ok_or(RenderError::SequenceTooLong {
                beats: length_beats,
                repeat: config.repeat,
                max_seconds: MAX_RENDER_SECONDS,
            })?;

    let mut pattern = vec![0.0_f32; pattern_frames * channel_count];
    for loaded in &loaded {
        mix_track(
            &mut pattern,
            channel_count,
            loaded,
            unit_samples,
            sample_rate,
        );
    }

    normalize(&mut pattern);
    let samples = pattern.repeat(config.repeat as usize);

    debug!(
        sample_rate,
        channels,
        length_beats,
        beat_samples,
        pattern_frames,
        total_frames = samples.len() / channel_count,
        "render completed"
    );

    Ok(RenderedAudio {
        sample_rate,
        channels,
        samples,
    })
}

fn validate_config(config: &Config) -> Result<(), RenderError> {
    if config.bpm == 0 {
        return Err(RenderError::InvalidConfig("bpm must be greater than zero"));
    }
    if config.beats_per_measure == 0 {
        return Err(RenderError::InvalidConfig(
            "beats_per_measure must be greater than zero",
        ));
    }
    if config.repeat == 0 {
        return Err(RenderError::InvalidConfig("repeat must be at least one"));
    }
    Ok(())
}

/// Frames in one pattern, or `None` when the tiled sequence would overflow
/// or run past [`MAX_RENDER_SECONDS`].
fn sequence_frames(
    length_beats: u32,
    beat_samples: usize,
    repeat: u32,
    sample_rate: u32,
    channels: usize,
) -> Option<usize> {
    let pattern_frames = usize::try_from(length_beats)
        .ok()?
        .checked_mul(beat_samples)?;
    let total_frames = pattern_frames.checked_mul(usize::try_from(repeat).ok()?)?;
    total_frames.checked_mul(channels)?;
    let max_frames = usize::try_from(MAX_RENDER_SECONDS)
        .ok()?
        .checked_mul(usize::try_from(sample_rate).ok()?)?;
    (total_frames <= max_frames).then_some(pattern_frames)
}

fn common_sample_rate(loaded: &[LoadedTrack<'_>]) -> Result<u32, RenderError> {
    if let Some(missing) = loaded.iter().find(|loaded| loaded.audio.sample_rate == 0) {
        return Err(RenderError::MissingSampleRate {
            path: missing.path.to_path_buf(),
        });
    }

    let mut rates: Vec<u32> = loaded.iter().map(|loaded| loaded.audio.sample_rate).collect();
    rates.sort_unstable();
    rates.dedup();
    match rates.as_slice() {
        [rate] => Ok(*rate),
        _ => Err(RenderError::SampleRateMismatch { rates }),
    }
}

fn common_channel_count(loaded: &[LoadedTrack<'_>]) -> Result<u16, RenderError> {
    let mut channels: Vec<u16> = loaded.iter().map(|loaded| loaded.audio.channels).collect();
    channels.sort_unstable();
    channels.dedup();
    match channels.as_slice() {
        [count] if *count > 0 => Ok(*count),
        _ => Err(RenderError::ChannelMismatch { channels }),
    }
}

/// Adds every trigger of one track into `pattern`, clipped to its bounds.
fn mix_track(
    pattern: &mut [f32],
    channels: usize,
    loaded: &LoadedTrack<'_>,
    unit_samples: f64,
    sample_rate: u32,
) {
    let pattern_frames = (pattern.len() / channels) as i64;
    let sample_frames = loaded.audio.frames() as i64;
    let attack_frames = (loaded.track.attack * f64::from(sample_rate)).round() as i64;
    let volume = loaded.track.volume;

    for &timing in &loaded.track.timing {
        // float to int casts saturate, so extreme attacks only push the
        // trigger out of the pattern
        let offset = (f64::from(timing) * unit_samples).round() as i64;
        let start = offset.saturating_sub(attack_frames);
        let end = start.saturating_add(sample_frames);

        let clip_start = 0_i64.saturating_sub(start).max(0);
        let clip_end = end.saturating_sub(pattern_frames).max(0);
        if start + clip_start >= end - clip_end {
            trace!(timing, start, "trigger falls outside the pattern");
            continue;
        }

        let destination = &mut pattern
            [((start + clip_start) as usize * channels)..((end - clip_end) as usize * channels)];
        let source = &loaded.audio.samples
            [(clip_start as usize * channels)..((sample_frames - clip_end) as usize * channels)];
        for (out, sample) in destination.iter_mut().zip(source) {
            *out += sample * volume;
        }
    }
}

fn normalize(pattern: &mut [f32]) {
    let peak = peak(pattern);
    if peak == 0.0 {
        debug!("silent pattern, skipping normalization");
        return;
    }

    let scale = MASTER_VOLUME / peak;
    for sample in pattern {
        *sample *= scale;
    }
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().copied().map(f32::abs).fold(0.0_f32, f32::max)
}
