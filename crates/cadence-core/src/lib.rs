pub mod diagnostics;
pub mod export;
pub mod fixtures;
pub mod grid;
pub mod model;
pub mod persistence;
pub mod render;
pub mod samples;
pub mod session;
pub mod settings;

pub use diagnostics::{TelemetryGuard, init_tracing, init_tracing_with_options};
pub use export::{save_sound, write_wav};
pub use grid::{Division, GridError, GridLayout, GridPosition, UNITS_PER_BEAT};
pub use model::{Config, DEFAULT_SAMPLE_RATE, MASTER_VOLUME, ParsedConfig, Track};
pub use persistence::{Project, ProjectError, load_project, save_project};
pub use render::{RenderError, RenderedAudio, render};
pub use samples::{DecodedAudio, FileSampleLoader, LoadError, SampleLoader};
pub use session::{CellKey, GridCell, Session, SessionError};
pub use settings::Settings;
