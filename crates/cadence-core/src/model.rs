use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const MASTER_VOLUME: f32 = 0.8;
pub const DEFAULT_BPM: u32 = 120;
pub const DEFAULT_BEATS_PER_MEASURE: u32 = 4;
pub const DEFAULT_REPEAT: u32 = 1;
pub const DEFAULT_TRACK_ATTACK: f64 = 0.0;
pub const DEFAULT_TRACK_VOLUME: f32 = 1.0;

/// One sound source and the grid positions it is triggered at.
///
/// A track equal to [`Track::default`] is inert: it is dropped before
/// rendering and before persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Track {
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    /// Trigger times in timing units (1/12 beat). Order and duplicates carry no meaning.
    pub timing: Vec<u32>,
    /// Pre-roll in seconds, subtracted from every trigger offset.
    pub attack: f64,
    /// Linear gain applied before mixing.
    pub volume: f32,
}

impl Default for Track {
    fn default() -> Self {
        Self {
            name: None,
            path: None,
            timing: Vec::new(),
            attack: DEFAULT_TRACK_ATTACK,
            volume: DEFAULT_TRACK_VOLUME,
        }
    }
}

impl Track {
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, timing: Vec<u32>) -> Self {
        Self {
            name: Some(name.into()),
            path: Some(path.into()),
            timing,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attack(mut self, attack: f64) -> Self {
        self.attack = attack;
        self
    }

    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    #[must_use]
    pub fn is_inert(&self) -> bool {
        *self == Self::default()
    }

    /// The sample path, when one is set and non-empty.
    #[must_use]
    pub fn sample_path(&self) -> Option<&Path> {
        self.path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    #[must_use]
    pub fn max_timing(&self) -> u32 {
        self.timing.iter().copied().max().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub bpm: u32,
    pub beats_per_measure: u32,
    /// Informational only; the rendered length is derived from the triggers.
    pub measures: Option<u32>,
    pub repeat: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            beats_per_measure: DEFAULT_BEATS_PER_MEASURE,
            measures: None,
            repeat: DEFAULT_REPEAT,
        }
    }
}

/// Result of lenient config parsing: the config plus the names of the fields
/// that were missing or invalid and fell back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfig {
    pub config: Config,
    pub defaulted_fields: Vec<&'static str>,
}

impl Config {
    #[must_use]
    pub fn new(bpm: u32, beats_per_measure: u32, repeat: u32) -> Self {
        Self {
            bpm,
            beats_per_measure,
            measures: None,
            repeat,
        }
    }

    /// Parses a config map field by field. Each field that is absent or has
    /// an unusable value falls back to its own default.
    #[must_use]
    pub fn from_json(value: &Value) -> ParsedConfig {
        let defaults = Self::default();
        let mut defaulted_fields = Vec::new();
        let map = value.as_object();

        let mut positive = |field: &'static str, fallback: u32| -> u32 {
            match map
                .and_then(|map| map.get(field))
                .and_then(Value::as_u64)
                .and_then(|raw| u32::try_from(raw).ok())
                .filter(|raw| *raw > 0)
            {
                Some(parsed) => parsed,
                None => {
                    defaulted_fields.push(field);
                    fallback
                }
            }
        };

        let bpm = positive("bpm", defaults.bpm);
        let beats_per_measure = positive("beats_per_measure", defaults.beats_per_measure);
        let repeat = positive("repeat", defaults.repeat);

        let measures = match map.and_then(|map| map.get("measures")) {
            Some(Value::Null) => None,
            Some(raw) => match raw.as_u64().and_then(|raw| u32::try_from(raw).ok()) {
                Some(parsed) => Some(parsed),
                None => {
                    defaulted_fields.push("measures");
                    defaults.measures
                }
            },
            None => {
                defaulted_fields.push("measures");
                defaults.measures
            }
        };

        // keep report order stable with the field order of the record
        defaulted_fields.sort_by_key(|field| field_order(field));

        ParsedConfig {
            config: Self {
                bpm,
                beats_per_measure,
                measures,
                repeat,
            },
            defaulted_fields,
        }
    }
}

fn field_order(field: &str) -> usize {
    match field {
        "bpm" => 0,
        "beats_per_measure" => 1,
        "measures" => 2,
        _ => 3,
    }
}
