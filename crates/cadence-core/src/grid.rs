use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timing units per beat. Divisible by both 4 and 3 so binary and triplet
/// subdivisions land on whole units.
pub const UNITS_PER_BEAT: u32 = 12;
pub const DEFAULT_UPPER_DIVISIONS: u32 = 4;
pub const DEFAULT_LOWER_DIVISIONS: u32 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("{count} buckets per beat does not divide a beat of 12 timing units")]
    InvalidDivisionCount { count: u32 },
    #[error("index {index} out of range for {division:?} division with {buckets} buckets")]
    IndexOutOfRange {
        division: Division,
        index: u32,
        buckets: u32,
    },
    #[error("timing {timing} does not fall on either grid division")]
    OffGrid { timing: u32 },
    #[error("beat {beat} is past the last representable timing")]
    TimingOverflow { beat: u32 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Division {
    /// Binary subdivisions (e.g. sixteenth notes).
    Upper,
    /// Triplet subdivisions.
    Lower,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridPosition {
    pub beat: u32,
    pub division: Division,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridLayout {
    upper: u32,
    lower: u32,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            upper: DEFAULT_UPPER_DIVISIONS,
            lower: DEFAULT_LOWER_DIVISIONS,
        }
    }
}

impl GridLayout {
    pub fn new(upper: u32, lower: u32) -> Result<Self, GridError> {
        for count in [upper, lower] {
            if count == 0 || UNITS_PER_BEAT % count != 0 {
                return Err(GridError::InvalidDivisionCount { count });
            }
        }
        Ok(Self { upper, lower })
    }

    #[must_use]
    pub fn buckets(&self, division: Division) -> u32 {
        match division {
            Division::Upper => self.upper,
            Division::Lower => self.lower,
        }
    }

    #[must_use]
    pub fn units_per_bucket(&self, division: Division) -> u32 {
        UNITS_PER_BEAT / self.buckets(division)
    }

    pub fn to_timing(&self, position: GridPosition) -> Result<u32, GridError> {
        let buckets = self.buckets(position.division);
        if position.index >= buckets {
            return Err(GridError::IndexOutOfRange {
                division: position.division,
                index: position.index,
                buckets,
            });
        }

        position
            .beat
            .checked_mul(UNITS_PER_BEAT)
            .and_then(|start| {
                start.checked_add(position.index * self.units_per_bucket(position.division))
            })
            .ok_or(GridError::TimingOverflow {
                beat: position.beat,
            })
    }

    /// Maps a timing value back onto the grid. A value that fits both
    /// divisions resolves to the upper one.
    pub fn from_timing(&self, timing: u32) -> Result<GridPosition, GridError> {
        let beat = timing / UNITS_PER_BEAT;
        let remainder = timing % UNITS_PER_BEAT;

        [Division::Upper, Division::Lower]
            .into_iter()
            .find_map(|division| {
                let step = self.units_per_bucket(division);
                (remainder % step == 0).then_some(GridPosition {
                    beat,
                    division,
                    index: remainder / step,
                })
            })
            .ok_or(GridError::OffGrid { timing })
    }
}

/// Whole samples per beat, truncated.
#[must_use]
pub fn samples_per_beat(bpm: u32, sample_rate: u32) -> usize {
    if bpm == 0 {
        return 0;
    }

    (60.0 / f64::from(bpm) * f64::from(sample_rate)).floor() as usize
}

/// Pattern length in beats: the smallest whole number of measures that
/// contains the last trigger.
#[must_use]
pub fn pattern_length_beats(max_timing: u32, beats_per_measure: u32) -> u32 {
    if beats_per_measure == 0 {
        return 0;
    }

    // one measure longer than u32::MAX units already holds every timing
    let measures = UNITS_PER_BEAT
        .checked_mul(beats_per_measure)
        .map_or(1, |units_per_measure| max_timing / units_per_measure + 1);
    // at most max_timing / 12 + beats_per_measure, which fits
    measures * beats_per_measure
}

#[must_use]
pub fn timing_to_seconds(timing: u32, bpm: u32) -> f64 {
    if bpm == 0 {
        return 0.0;
    }

    f64::from(timing) / f64::from(UNITS_PER_BEAT) * (60.0 / f64::from(bpm))
}
