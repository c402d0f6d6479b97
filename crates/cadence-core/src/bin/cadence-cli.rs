use std::path::PathBuf;

use anyhow::Context;
use cadence_core::{
    FileSampleLoader, Settings,
    diagnostics::init_tracing_with_options,
    export::save_sound,
    fixtures::{demo_config, demo_tracks, write_demo_kit},
    grid::timing_to_seconds,
    persistence::{load_project, save_project},
    samples::scan_sample_library,
};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "cadence-cli")]
#[command(about = "Headless tools for rendering and inspecting Cadence projects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides the logs directory from the settings file.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a project to a WAV file.
    Render {
        project: PathBuf,

        #[arg(long, short)]
        output: PathBuf,
    },
    /// Print a project's config and every trigger's grid position.
    Inspect { project: PathBuf },
    /// Write a synthesized kit, a demo project and its rendered WAV.
    Demo {
        #[arg(long, default_value = "demo")]
        output_dir: PathBuf,
    },
    /// List samples in the library directories.
    Samples {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_or_default()?;
    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| settings.diagnostics.logs_dir.clone());
    let _telemetry = init_tracing_with_options(
        &log_dir,
        &settings.diagnostics.log_file_prefix,
        &settings.diagnostics.log_filter,
    )?;

    match cli.command {
        Commands::Render { project, output } => {
            let loaded = load_project(&project)?;
            let rendered = save_sound(&output, &loaded.tracks, &loaded.config, &FileSampleLoader)?;
            tracing::info!(
                path = %output.display(),
                frames = rendered.frames(),
                seconds = rendered.duration_seconds(),
                "project rendered"
            );
        }
        Commands::Inspect { project } => {
            let loaded = load_project(&project)?;
            let grid = settings.grid_layout()?;
            let config = loaded.config;
            println!(
                "bpm {} | {} beats/measure | repeat {} | measures {}",
                config.bpm,
                config.beats_per_measure,
                config.repeat,
                config
                    .measures
                    .map_or_else(|| "-".to_string(), |measures| measures.to_string())
            );
            for field in &loaded.defaulted_fields {
                println!("  (config field `{field}` defaulted)");
            }

            for (index, track) in loaded.tracks.iter().enumerate() {
                let name = track.name.as_deref().unwrap_or("(unnamed)");
                let path = track
                    .sample_path()
                    .map_or_else(|| "(no file)".to_string(), |path| path.display().to_string());
                println!(
                    "track {index}: {name} | {path} | attack {:.3}s | volume {:.2}",
                    track.attack, track.volume
                );

                let mut timing = track.timing.clone();
                timing.sort_unstable();
                for value in timing {
                    match grid.from_timing(value) {
                        Ok(position) => println!(
                            "    {value:>4} -> beat {} {:?} #{} ({:.3}s)",
                            position.beat,
                            position.division,
                            position.index,
                            timing_to_seconds(value, config.bpm)
                        ),
                        Err(error) => println!("    {value:>4} -> {error}"),
                    }
                }
            }
        }
        Commands::Demo { output_dir } => {
            let kit = write_demo_kit(&output_dir.join("kit"))?;
            let tracks = demo_tracks(&kit);
            let config = demo_config();

            let project_path = output_dir.join("demo.cadence");
            save_project(&project_path, &tracks, &config)
                .with_context(|| format!("failed to save demo project {}", project_path.display()))?;
            let wav_path = output_dir.join("demo.wav");
            save_sound(&wav_path, &tracks, &config, &FileSampleLoader)?;
            tracing::info!(
                project = %project_path.display(),
                wav = %wav_path.display(),
                "demo written"
            );
        }
        Commands::Samples { dir } => {
            let directories = dir.map_or_else(|| settings.library.sample_dirs.clone(), |dir| vec![dir]);
            for directory in directories {
                for entry in scan_sample_library(&directory)? {
                    println!("{}\t{} bytes", entry.path, entry.size_bytes);
                }
            }
        }
    }

    Ok(())
}
