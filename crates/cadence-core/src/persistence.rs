//! Project containers on disk.
//!
//! A project is a directory named `NAME.cadence` holding `project.json` and a
//! `sounds/` directory with a copy of every sample the tracks reference.
//! Track paths are stored relative to the container (`sounds/kick.wav`) and
//! resolved back to absolute paths on load.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    export::has_extension,
    model::{Config, Track},
};

pub const PROJECT_EXTENSION: &str = "cadence";
pub const PROJECT_METADATA_FILE: &str = "project.json";
pub const PROJECT_SOUNDS_DIR: &str = "sounds";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project path must end with .cadence: {path:?}")]
    InvalidExtension { path: PathBuf },
    #[error("project already exists at {path:?}")]
    AlreadyExists { path: PathBuf },
    #[error("project does not exist at {path:?}")]
    NotFound { path: PathBuf },
    #[error("project path is not a directory: {path:?}")]
    NotADirectory { path: PathBuf },
    #[error("invalid project {path:?}: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },
    #[error("sample path has no file name: {path:?}")]
    InvalidAssetPath { path: PathBuf },
    #[error("two different samples share the file name {file_name}: {first:?} and {second:?}")]
    AssetNameCollision {
        file_name: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProjectError {
    fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }

    fn invalid_format(path: &Path, reason: impl ToString) -> Self {
        Self::InvalidFormat {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Tracks and config read back from a project container.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub tracks: Vec<Track>,
    pub config: Config,
    /// Config fields that were missing or invalid and fell back to defaults.
    pub defaulted_fields: Vec<&'static str>,
}

#[derive(Serialize)]
struct ProjectDocument<'a> {
    tracks: Vec<Track>,
    config: &'a Config,
}

#[derive(Deserialize)]
struct StoredProjectDocument {
    #[serde(default)]
    tracks: Vec<Track>,
    #[serde(default)]
    config: Value,
}

#[instrument(skip(tracks, config), fields(path = %container.display(), tracks = tracks.len()))]
pub fn save_project(
    container: &Path,
    tracks: &[Track],
    config: &Config,
) -> Result<(), ProjectError> {
    if !has_extension(container, PROJECT_EXTENSION) {
        return Err(ProjectError::InvalidExtension {
            path: container.to_path_buf(),
        });
    }
    if container.exists() {
        return Err(ProjectError::AlreadyExists {
            path: container.to_path_buf(),
        });
    }

    let assets = plan_assets(tracks)?;

    let sounds_dir = container.join(PROJECT_SOUNDS_DIR);
    fs::create_dir_all(container).map_err(ProjectError::io(format!(
        "failed to create project directory {}",
        container.display()
    )))?;
    fs::create_dir(&sounds_dir).map_err(ProjectError::io(format!(
        "failed to create sounds directory {}",
        sounds_dir.display()
    )))?;

    // A failure past this point leaves a partially written container behind.
    for (file_name, source) in &assets {
        let destination = sounds_dir.join(file_name);
        fs::copy(source, &destination).map_err(ProjectError::io(format!(
            "failed to copy sample {} into project",
            source.display()
        )))?;
        debug!(source = %source.display(), destination = %destination.display(), "sample copied");
    }

    let document = ProjectDocument {
        tracks: tracks
            .iter()
            .filter(|track| !track.is_inert())
            .map(relativize_track)
            .collect::<Result<_, _>>()?,
        config,
    };
    write_metadata(container, &document)?;

    info!(
        saved_tracks = document.tracks.len(),
        assets = assets.len(),
        "project saved"
    );
    Ok(())
}

#[instrument(fields(path = %container.display()))]
pub fn load_project(container: &Path) -> Result<Project, ProjectError> {
    if !has_extension(container, PROJECT_EXTENSION) {
        return Err(ProjectError::InvalidExtension {
            path: container.to_path_buf(),
        });
    }
    if !container.exists() {
        return Err(ProjectError::NotFound {
            path: container.to_path_buf(),
        });
    }
    if !container.is_dir() {
        return Err(ProjectError::NotADirectory {
            path: container.to_path_buf(),
        });
    }

    let metadata_path = container.join(PROJECT_METADATA_FILE);
    let content = fs::read(&metadata_path)
        .map_err(|error| ProjectError::invalid_format(&metadata_path, error))?;
    let document: StoredProjectDocument = serde_json::from_slice(&content)
        .map_err(|error| ProjectError::invalid_format(&metadata_path, error))?;

    let sounds_dir = std::path::absolute(container)
        .map_err(ProjectError::io(format!(
            "failed to resolve project path {}",
            container.display()
        )))?
        .join(PROJECT_SOUNDS_DIR);

    let tracks = document
        .tracks
        .into_iter()
        .map(|track| absolutize_track(track, &sounds_dir, &metadata_path))
        .filter(|track| track.as_ref().map_or(true, |track| !track.is_inert()))
        .collect::<Result<Vec<_>, _>>()?;

    let parsed = Config::from_json(&document.config);
    for field in &parsed.defaulted_fields {
        warn!(field = %field, "config field missing or invalid, using default");
    }

    info!(tracks = tracks.len(), "project loaded");
    Ok(Project {
        tracks,
        config: parsed.config,
        defaulted_fields: parsed.defaulted_fields,
    })
}

/// Maps each distinct sample file name to its source path.
fn plan_assets(tracks: &[Track]) -> Result<BTreeMap<OsString, PathBuf>, ProjectError> {
    let mut assets: BTreeMap<OsString, PathBuf> = BTreeMap::new();

    for path in tracks.iter().filter_map(Track::sample_path) {
        let file_name = path
            .file_name()
            .ok_or_else(|| ProjectError::InvalidAssetPath {
                path: path.to_path_buf(),
            })?
            .to_os_string();

        match assets.get(&file_name) {
            None => {
                assets.insert(file_name, path.to_path_buf());
            }
            Some(existing) if existing == path || same_contents(existing, path)? => {}
            Some(existing) => {
                return Err(ProjectError::AssetNameCollision {
                    file_name: file_name.to_string_lossy().into_owned(),
                    first: existing.clone(),
                    second: path.to_path_buf(),
                });
            }
        }
    }

    Ok(assets)
}

fn same_contents(left: &Path, right: &Path) -> Result<bool, ProjectError> {
    let read = |path: &Path| {
        fs::read(path).map_err(ProjectError::io(format!(
            "failed to read sample {}",
            path.display()
        )))
    };
    Ok(read(left)? == read(right)?)
}

fn relativize_track(track: &Track) -> Result<Track, ProjectError> {
    let mut stored = track.clone();
    if let Some(path) = track.sample_path() {
        let file_name = path
            .file_name()
            .ok_or_else(|| ProjectError::InvalidAssetPath {
                path: path.to_path_buf(),
            })?;
        stored.path = Some(Path::new(PROJECT_SOUNDS_DIR).join(file_name));
    }
    Ok(stored)
}

fn absolutize_track(
    mut track: Track,
    sounds_dir: &Path,
    metadata_path: &Path,
) -> Result<Track, ProjectError> {
    if let Some(path) = track.sample_path() {
        let file_name = path.file_name().ok_or_else(|| {
            ProjectError::invalid_format(
                metadata_path,
                format!("track path has no file name: {}", path.display()),
            )
        })?;
        track.path = Some(sounds_dir.join(file_name));
    }
    Ok(track)
}

fn write_metadata(container: &Path, document: &ProjectDocument<'_>) -> Result<(), ProjectError> {
    let metadata_path = container.join(PROJECT_METADATA_FILE);
    let json = serde_json::to_vec_pretty(document)
        .map_err(|error| ProjectError::invalid_format(&metadata_path, error))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(container)
        .map_err(ProjectError::io("failed to create temp project file"))?;
    temp_file
        .write_all(&json)
        .map_err(ProjectError::io("failed to write temp project file"))?;
    temp_file
        .persist(&metadata_path)
        .map_err(|error| error.error)
        .map_err(ProjectError::io(format!(
            "failed to persist project metadata {}",
            metadata_path.display()
        )))?;
    Ok(())
}
