//! # FSO-volume library
//!
//! This crate estimates the directional resolution of a cryo-EM
//! reconstruction from its two independently refined half maps.

//!
//! The half maps are Fourier transformed and the Fourier shell correlation
//! (FSC) is computed globally and inside a cone around every direction of a
//! fixed hemisphere sampling. The directional curves give a resolution per
//! direction, an occupancy curve (the fraction of directions resolved per
//! shell), a rot/tilt resolution distribution and a 3D FSC field, which is
//! also used to filter the summed map. Directions are processed in parallel
//! using rayon.
//!
//! Volumes are read from and written to MRC files. Modes supported for
//! reading:
//!  - 0 (int8)
//!  - 1 (int16)
//!  - 2 (float32)
//!  - 6 (uint16)
//!
//!  Results are always written as float32 maps (mode 2) and plain text
//!  tables, with a JSON summary of the run.
//!
//! # Examples
//!
//! ## Directional resolution of two half maps
//!
//! Load both halves, run the analysis with a 20° cone and write every
//! artifact into the `results/` folder.
//!
//! ```no_run
//! # use fso_volume::{AnalysisConfig, FsoAnalysis, ResultWriter, VolumeLoader};
//! let half1 = VolumeLoader::load_from_file("half1.mrc").expect("should have loaded half 1");
//! let half2 = VolumeLoader::load_from_file("half2.mrc").expect("should have loaded half 2");
//! let config = AnalysisConfig::new(20.0).with_pixel_size(half1.pixel_size);
//! let results = FsoAnalysis::new(config.clone())
//!     .expect("should have accepted the configuration")
//!     .run(half1, half2, None)
//!     .expect("should have analysed the half maps");
//! println!("global resolution: {}", results.global_resolution);
//! ResultWriter::new("results")
//!     .write_all(&results, &config)
//!     .expect("should have written the results");
//! ```

pub mod anisotropy;
pub mod config;
pub mod directional;
pub mod directions;
pub mod enums;
pub mod filter;
pub mod fourier;
pub mod frequency;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod resolution;
pub mod shells;
pub mod volume;
pub mod volume_loader;

pub use config::AnalysisConfig;
pub use output::ResultWriter;
pub use pipeline::{FsoAnalysis, FsoError, FsoResults};
pub use resolution::ResolutionEstimate;
pub use volume::Volume;
pub use volume_loader::VolumeLoader;
