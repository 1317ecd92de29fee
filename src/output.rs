use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::Array3;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::config::AnalysisConfig;
use crate::enums::Orientation;
use crate::pipeline::FsoResults;
use crate::resolution::{ResolutionEstimate, ShellCurve};
use crate::volume::Volume;
use crate::volume_loader::{VolumeLoader, VolumeLoaderError};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Map(#[from] VolumeLoaderError),

    #[error("Failed to serialise {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Nothing to render for {path}")]
    EmptyPreview { path: PathBuf },
}

impl OutputError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Serialize)]
struct DirectionSummary {
    rot: f64,
    tilt: f64,
    #[serde(flatten)]
    resolution: ResolutionEstimate,
    occupancy: usize,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    config: &'a AnalysisConfig,
    dimensions: (usize, usize, usize),
    global: ResolutionEstimate,
    global_resolution: Option<f64>,
    best_directional_resolution: Option<f64>,
    worst_directional_resolution: Option<f64>,
    resolved_directions: usize,
    directions: Vec<DirectionSummary>,
}

/// Writes every artifact of an analysis into one folder.
pub struct ResultWriter {
    output_dir: PathBuf,
    save_directional: bool,
    previews: bool,
}

impl ResultWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            save_directional: false,
            previews: false,
        }
    }

    /// Also write one `fscDirection_<k>.txt` curve per direction.
    pub fn with_directional_curves(mut self, enabled: bool) -> Self {
        self.save_directional = enabled;
        self
    }

    /// Also write PNG previews of the filtered map and the distribution.
    pub fn with_previews(mut self, enabled: bool) -> Self {
        self.previews = enabled;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write all artifacts and return the paths that were written.
    ///
    /// # Errors
    ///
    /// Every artifact is attempted even if an earlier one failed; failures
    /// are logged and the first one is returned.
    pub fn write_all(
        &self,
        results: &FsoResults,
        config: &AnalysisConfig,
    ) -> Result<Vec<PathBuf>, OutputError> {
        fs::create_dir_all(&self.output_dir).map_err(OutputError::io(&self.output_dir))?;

        let mut attempts: Vec<(PathBuf, Result<(), OutputError>)> = Vec::new();
        let mut attempt = |name: &str, write: &dyn Fn(&Path) -> Result<(), OutputError>| {
            let path = self.output_dir.join(name);
            let outcome = write(&path);
            attempts.push((path, outcome));
        };

        attempt("GlobalFSC.txt", &|path: &Path| {
            write_curve(path, "fsc", &results.global_fsc)
        });
        attempt("Anisotropy.txt", &|path: &Path| {
            write_curve(path, "occupancy", &results.occupancy)
        });
        attempt("ResolutionDistribution.txt", &|path: &Path| {
            write_distribution(path, results)
        });
        attempt("DirectionalResolution.txt", &|path: &Path| {
            write_directional(path, results)
        });
        attempt("summary.json", &|path: &Path| {
            write_summary(path, results, config)
        });

        let pixel_size = results.pixel_size;
        let maps = [
            ("3dFSC_half.mrc", &results.fsc_3d_half),
            ("3dFSC.mrc", &results.fsc_3d_full),
            ("filteredMap.mrc", &results.filtered),
            ("sphere.mrc", &results.frequency_sphere),
        ];
        for (name, data) in maps {
            attempt(name, &|path: &Path| write_map(path, data, pixel_size));
        }

        if self.save_directional {
            for (k, direction) in results.directional.iter().enumerate() {
                attempt(&format!("fscDirection_{k}.txt"), &|path: &Path| {
                    write_curve(path, "fsc", &direction.curve)
                });
            }
        }

        if self.previews {
            let filtered = Volume::new(results.filtered.clone(), pixel_size);
            for orientation in Orientation::ALL {
                let name = format!("filteredMap_{}.png", orientation.name());
                attempt(&name, &|path: &Path| {
                    let image = filtered.get_center_image(orientation).ok_or_else(|| {
                        OutputError::EmptyPreview {
                            path: path.to_path_buf(),
                        }
                    })?;
                    save_image(path, &image)
                });
            }
            attempt("ResolutionDistribution.png", &|path: &Path| {
                // Tilt down the rows, rotation across.
                let view = results.distribution.values.t();
                let image = Volume::slice_to_image(&view).ok_or_else(|| {
                    OutputError::EmptyPreview {
                        path: path.to_path_buf(),
                    }
                })?;
                save_image(path, &image)
            });
        }

        let mut written = Vec::with_capacity(attempts.len());
        let mut first_error = None;
        for (path, outcome) in attempts {
            match outcome {
                Ok(()) => written.push(path),
                Err(err) => {
                    error!(path = %path.display(), "{err}");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => {
                info!(files = written.len(), dir = %self.output_dir.display(), "results written");
                Ok(written)
            }
        }
    }
}

fn write_text(
    path: &Path,
    body: impl FnOnce(&mut BufWriter<File>) -> io::Result<()>,
) -> Result<(), OutputError> {
    let file = File::create(path).map_err(OutputError::io(path))?;
    let mut writer = BufWriter::new(file);
    body(&mut writer)
        .and_then(|()| writer.flush())
        .map_err(OutputError::io(path))
}

/// Rows of frequency, value and resolution for every shell but DC.
fn write_curve(path: &Path, label: &str, curve: &ShellCurve) -> Result<(), OutputError> {
    write_text(path, |w| {
        writeln!(w, "# frequency(1/A) {label} resolution(A)")?;
        for (&frequency, &value) in curve.frequencies.iter().zip(&curve.values).skip(1) {
            writeln!(w, "{frequency:.6} {value:.6} {:.4}", frequency.recip())?;
        }
        Ok(())
    })
}

fn write_distribution(path: &Path, results: &FsoResults) -> Result<(), OutputError> {
    write_text(path, |w| {
        writeln!(w, "# rot(deg) tilt(deg) resolution(A)")?;
        for (rot, tilt, value) in results.distribution.rows() {
            writeln!(w, "{rot} {tilt} {value:.4}")?;
        }
        Ok(())
    })
}

fn write_directional(path: &Path, results: &FsoResults) -> Result<(), OutputError> {
    write_text(path, |w| {
        writeln!(
            w,
            "# direction rot(deg) tilt(deg) frequency(1/A) resolution(A)"
        )?;
        for (k, result) in results.directional.iter().enumerate() {
            let rot = result.direction.rot.to_degrees();
            let tilt = result.direction.tilt.to_degrees();
            match result.resolution {
                ResolutionEstimate::Resolved { frequency, .. } => writeln!(
                    w,
                    "{k} {rot:.4} {tilt:.4} {frequency:.6} {:.4}",
                    frequency.recip()
                )?,
                ResolutionEstimate::NotResolved { limit_frequency } => writeln!(
                    w,
                    "{k} {rot:.4} {tilt:.4} not resolved (better than {:.4})",
                    limit_frequency.recip()
                )?,
            }
        }
        Ok(())
    })
}

fn write_summary(
    path: &Path,
    results: &FsoResults,
    config: &AnalysisConfig,
) -> Result<(), OutputError> {
    let resolutions: Vec<f64> = results
        .directional
        .iter()
        .filter_map(|result| result.resolution.resolution())
        .collect();
    let summary = RunSummary {
        config,
        dimensions: results.filtered.dim(),
        global: results.global_resolution,
        global_resolution: results.global_resolution.resolution(),
        best_directional_resolution: resolutions.iter().copied().reduce(f64::min),
        worst_directional_resolution: resolutions.iter().copied().reduce(f64::max),
        resolved_directions: resolutions.len(),
        directions: results
            .directional
            .iter()
            .map(|result| DirectionSummary {
                rot: result.direction.rot.to_degrees(),
                tilt: result.direction.tilt.to_degrees(),
                resolution: result.resolution,
                occupancy: result.occupancy,
            })
            .collect(),
    };

    let file = File::create(path).map_err(OutputError::io(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &summary).map_err(|source| OutputError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(OutputError::io(path))
}

fn write_map(path: &Path, data: &Array3<f64>, pixel_size: f64) -> Result<(), OutputError> {
    VolumeLoader::save_to_file(&Volume::new(data.clone(), pixel_size), path)?;
    Ok(())
}

fn save_image(path: &Path, image: &image::GrayImage) -> Result<(), OutputError> {
    image.save(path).map_err(|source| OutputError::Image {
        path: path.to_path_buf(),
        source,
    })
}
