use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    diagnostics::{DEFAULT_LOG_FILE_PREFIX, DEFAULT_LOG_FILTER},
    grid::{DEFAULT_LOWER_DIVISIONS, DEFAULT_UPPER_DIVISIONS, GridLayout},
    model::{Config, DEFAULT_BEATS_PER_MEASURE, DEFAULT_BPM},
    session::{DEFAULT_SESSION_BEATS, Session},
};

pub const SETTINGS_FILE_NAME: &str = "cadence.config.toml";
pub const SETTINGS_PATH_ENV: &str = "CADENCE_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub defaults: DefaultsSettings,
    pub grid: GridSettings,
    pub diagnostics: DiagnosticsSettings,
    pub library: LibrarySettings,
}

/// Config values for new sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DefaultsSettings {
    pub bpm: u32,
    pub beats_per_measure: u32,
    pub repeat: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridSettings {
    pub upper_divisions: u32,
    pub lower_divisions: u32,
    pub beats: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnosticsSettings {
    pub log_filter: String,
    pub log_file_prefix: String,
    pub logs_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LibrarySettings {
    pub sample_dirs: Vec<PathBuf>,
}

impl Default for DefaultsSettings {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            beats_per_measure: DEFAULT_BEATS_PER_MEASURE,
            repeat: 4,
        }
    }
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            upper_divisions: DEFAULT_UPPER_DIVISIONS,
            lower_divisions: DEFAULT_LOWER_DIVISIONS,
            beats: DEFAULT_SESSION_BEATS,
        }
    }
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            sample_dirs: vec![PathBuf::from("sounds")],
        }
    }
}

impl Settings {
    /// Loads the settings file if one can be found, otherwise the defaults.
    /// A file that exists but does not parse is an error.
    pub fn load_or_default() -> Result<Self> {
        match discover_settings_path()? {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("no settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("failed to parse settings TOML from {}", path.display()))?;
        debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    #[must_use]
    pub fn default_config(&self) -> Config {
        Config::new(
            self.defaults.bpm,
            self.defaults.beats_per_measure,
            self.defaults.repeat,
        )
    }

    pub fn grid_layout(&self) -> Result<GridLayout> {
        GridLayout::new(self.grid.upper_divisions, self.grid.lower_divisions)
            .context("invalid grid settings")
    }

    /// An empty session using the configured defaults and grid.
    pub fn new_session(&self) -> Result<Session> {
        Ok(Session::new(
            self.default_config(),
            self.grid_layout()?,
            self.grid.beats,
        ))
    }
}

fn discover_settings_path() -> Result<Option<PathBuf>> {
    if let Some(path) = env::var_os(SETTINGS_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(Some(path));
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(SETTINGS_FILE_NAME),
        cwd.join("..").join(SETTINGS_FILE_NAME),
    ];

    Ok(candidates.into_iter().find(|path| path.is_file()))
}
