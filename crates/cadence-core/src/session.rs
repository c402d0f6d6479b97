use std::{collections::BTreeSet, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
    export,
    grid::{Division, GridError, GridLayout, GridPosition},
    model::{Config, Track},
    persistence::{self, ProjectError},
    render::{self, RenderError, RenderedAudio},
    samples::SampleLoader,
};

pub const DEFAULT_SESSION_TRACKS: usize = 8;
pub const DEFAULT_SESSION_BEATS: u32 = 16;
pub const MAX_SESSION_BPM: u32 = 300;
pub const MAX_SESSION_REPEAT: u32 = 100;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("track index {0} out of range")]
    TrackOutOfRange(usize),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error("export failed: {0}")]
    Export(String),
}

impl From<anyhow::Error> for SessionError {
    fn from(value: anyhow::Error) -> Self {
        Self::Export(format!("{value:#}"))
    }
}

/// Identifies one grid cell: a track row and a position on the beat grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub track: usize,
    pub position: GridPosition,
}

impl CellKey {
    #[must_use]
    pub fn new(track: usize, beat: u32, division: Division, index: u32) -> Self {
        Self {
            track,
            position: GridPosition {
                beat,
                division,
                index,
            },
        }
    }
}

/// View model for one grid cell, independent of any UI toolkit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridCell {
    pub key: CellKey,
    pub timing: u32,
    pub enabled: bool,
    /// Alternating beat shading.
    pub even_beat: bool,
}

/// Editing state owned by a front end: its own copy of the tracks and config
/// plus the set of enabled grid cells. Track timings are always derived from
/// the enabled cells.
#[derive(Debug, Clone)]
pub struct Session {
    tracks: Vec<Track>,
    config: Config,
    grid: GridLayout,
    beats: u32,
    enabled: BTreeSet<CellKey>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Config::default(), GridLayout::default(), DEFAULT_SESSION_BEATS)
    }
}

impl Session {
    #[must_use]
    pub fn new(config: Config, grid: GridLayout, beats: u32) -> Self {
        Self {
            tracks: vec![Track::default(); DEFAULT_SESSION_TRACKS],
            config: bounded_config(config),
            grid,
            beats,
            enabled: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn grid(&self) -> &GridLayout {
        &self.grid
    }

    #[must_use]
    pub fn beats(&self) -> u32 {
        self.beats
    }

    /// Stores `config` with bpm and repeat clamped to the editing range and
    /// beats per measure raised to at least one. Returns the stored config.
    #[instrument(skip(self))]
    pub fn set_config(&mut self, config: Config) -> Config {
        self.config = bounded_config(config);
        info!(bpm = self.config.bpm, repeat = self.config.repeat, "session config updated");
        self.config
    }

    /// Replaces all tracks and re-derives the enabled cells from their timings.
    #[instrument(skip(self, tracks), fields(tracks = tracks.len()))]
    pub fn set_tracks(&mut self, tracks: Vec<Track>) -> Result<(), SessionError> {
        let mut enabled = BTreeSet::new();
        let mut last_beat = 0;
        for (track_index, track) in tracks.iter().enumerate() {
            for &timing in &track.timing {
                let position = self.grid.from_timing(timing)?;
                last_beat = last_beat.max(position.beat);
                enabled.insert(CellKey {
                    track: track_index,
                    position,
                });
            }
        }

        self.enabled = enabled;
        self.tracks = tracks;
        if !self.enabled.is_empty() && last_beat >= self.beats {
            self.beats = last_beat + 1;
            debug!(beats = self.beats, "grid extended to fit loaded triggers");
        }
        self.sync_timings();
        info!(cells = self.enabled.len(), "session tracks replaced");
        Ok(())
    }

    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn set_track_sample(
        &mut self,
        track_index: usize,
        name: Option<String>,
        path: impl AsRef<Path>,
    ) -> Result<Track, SessionError> {
        let track = self.track_mut(track_index)?;
        track.path = Some(path.as_ref().to_path_buf());
        if name.is_some() {
            track.name = name;
        }
        let track = track.clone();
        info!("track sample assigned");
        Ok(track)
    }

    #[instrument(skip(self))]
    pub fn set_track_mix(
        &mut self,
        track_index: usize,
        attack: Option<f64>,
        volume: Option<f32>,
    ) -> Result<Track, SessionError> {
        let track = self.track_mut(track_index)?;
        if let Some(attack) = attack {
            track.attack = attack.max(0.0);
        }
        if let Some(volume) = volume {
            track.volume = volume.clamp(0.0, 1.0);
        }
        Ok(track.clone())
    }

    /// Flips one cell and returns its new state.
    #[instrument(skip(self), fields(track = key.track, beat = key.position.beat))]
    pub fn toggle_cell(&mut self, key: CellKey) -> Result<bool, SessionError> {
        if key.track >= self.tracks.len() {
            return Err(SessionError::TrackOutOfRange(key.track));
        }
        self.grid.to_timing(key.position)?;

        let enabled = if self.enabled.remove(&key) {
            false
        } else {
            self.enabled.insert(key);
            true
        };
        self.sync_timings();
        debug!(enabled, "cell toggled");
        Ok(enabled)
    }

    #[must_use]
    pub fn is_enabled(&self, key: &CellKey) -> bool {
        self.enabled.contains(key)
    }

    /// Every cell of the visible grid, row by row.
    #[must_use]
    pub fn cells(&self) -> Vec<GridCell> {
        let mut cells = Vec::new();
        for track in 0..self.tracks.len() {
            for beat in 0..self.beats {
                for division in [Division::Upper, Division::Lower] {
                    for index in 0..self.grid.buckets(division) {
                        let key = CellKey::new(track, beat, division, index);
                        let Ok(timing) = self.grid.to_timing(key.position) else {
                            continue;
                        };
                        cells.push(GridCell {
                            key,
                            timing,
                            enabled: self.enabled.contains(&key),
                            even_beat: beat % 2 == 0,
                        });
                    }
                }
            }
        }
        cells
    }

    pub fn render(&self, loader: &impl SampleLoader) -> Result<RenderedAudio, SessionError> {
        Ok(render::render(&self.tracks, &self.config, loader)?)
    }

    #[instrument(skip(self, loader), fields(path = %path.display()))]
    pub fn export_wav(
        &self,
        path: &Path,
        loader: &impl SampleLoader,
    ) -> Result<RenderedAudio, SessionError> {
        Ok(export::save_sound(path, &self.tracks, &self.config, loader)?)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn save_project(&self, path: &Path) -> Result<(), SessionError> {
        persistence::save_project(path, &self.tracks, &self.config)?;
        Ok(())
    }

    /// Loads a project into this session, keeping at least the default
    /// number of track rows.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn load_project(&mut self, path: &Path) -> Result<(), SessionError> {
        let project = persistence::load_project(path)?;
        let mut tracks = project.tracks;
        if tracks.len() < DEFAULT_SESSION_TRACKS {
            tracks.resize(DEFAULT_SESSION_TRACKS, Track::default());
        }
        self.set_tracks(tracks)?;
        self.set_config(project.config);
        Ok(())
    }

    fn track_mut(&mut self, track_index: usize) -> Result<&mut Track, SessionError> {
        self.tracks
            .get_mut(track_index)
            .ok_or(SessionError::TrackOutOfRange(track_index))
    }

    fn sync_timings(&mut self) {
        let row_count = self
            .enabled
            .iter()
            .map(|key| key.track + 1)
            .max()
            .unwrap_or_default()
            .max(self.tracks.len());
        if self.tracks.len() < row_count {
            self.tracks.resize(row_count, Track::default());
        }

        for track in &mut self.tracks {
            track.timing.clear();
        }
        for key in &self.enabled {
            // cells were validated against the grid on insert
            if let Ok(timing) = self.grid.to_timing(key.position) {
                self.tracks[key.track].timing.push(timing);
            }
        }
        for track in &mut self.tracks {
            track.timing.sort_unstable();
            track.timing.dedup();
        }
    }
}

fn bounded_config(config: Config) -> Config {
    Config {
        bpm: config.bpm.clamp(1, MAX_SESSION_BPM),
        beats_per_measure: config.beats_per_measure.max(1),
        measures: config.measures,
        repeat: config.repeat.clamp(1, MAX_SESSION_REPEAT),
    }
}
