use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fso_volume::{
    AnalysisConfig, FsoAnalysis, ResultWriter, VolumeLoader, config::ConfigError,
    enums::DirectionSampling, logging, resolution::DEFAULT_THRESHOLD,
};
use tracing::{error, info, warn};
use web_time::Instant;

/// Directional Fourier shell correlation of two half maps.
#[derive(Debug, Parser)]
#[command(name = "fso", version, about)]
struct Cli {
    /// First half map (MRC)
    #[arg(long)]
    half1: PathBuf,

    /// Second half map (MRC)
    #[arg(long)]
    half2: PathBuf,

    /// Mask multiplied into both halves (MRC)
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Pixel size in Å; taken from the half 1 header when omitted
    #[arg(long)]
    sampling: Option<f64>,

    /// Cone half-angle in degrees
    #[arg(long)]
    anglecone: Option<f64>,

    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    #[arg(long, default_value_t = 1)]
    threads: usize,

    #[arg(long, value_enum, default_value_t = DirectionSampling::Fine)]
    directions: DirectionSampling,

    /// Output folder
    #[arg(long, default_value = "fso_results")]
    output: PathBuf,

    /// Write the FSC curve of every direction
    #[arg(long)]
    save_directional: bool,

    /// Write PNG previews
    #[arg(long)]
    previews: bool,
}

fn main() -> ExitCode {
    if let Err(err) = logging::init_tracing() {
        eprintln!("{err}");
    }
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let config = config_from_cli(&cli)?;

    let half1 = VolumeLoader::load_from_file(&cli.half1)?;
    let half2 = VolumeLoader::load_from_file(&cli.half2)?;
    let mask = cli
        .mask
        .as_ref()
        .map(VolumeLoader::load_from_file)
        .transpose()?;

    let config = match cli.sampling {
        Some(sampling) => {
            if (sampling - half1.pixel_size).abs() > 1e-3 {
                warn!(
                    sampling,
                    header = half1.pixel_size,
                    "pixel size differs from the map header"
                );
            }
            config
        }
        None => config.with_pixel_size(half1.pixel_size),
    };
    info!(
        ?config,
        half1 = %cli.half1.display(),
        half2 = %cli.half2.display(),
        "starting analysis"
    );

    let mask = mask.as_ref().map(|mask| mask.data());
    let results = FsoAnalysis::new(config.clone())?.run(half1, half2, mask)?;
    info!(resolution = %results.global_resolution, "global FSC resolution");

    ResultWriter::new(&cli.output)
        .with_directional_curves(cli.save_directional)
        .with_previews(cli.previews)
        .write_all(&results, &config)?;
    info!(elapsed = ?started.elapsed(), "done");
    Ok(())
}

/// Validated configuration from the flags alone, before any map is read.
/// Without `--sampling` the pixel size is a placeholder until the header is known.
fn config_from_cli(cli: &Cli) -> Result<AnalysisConfig, ConfigError> {
    AnalysisConfig::from_parts(
        cli.anglecone,
        cli.sampling.unwrap_or(1.0),
        cli.threshold,
        cli.directions,
        cli.threads,
    )
}
