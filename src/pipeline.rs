use ndarray::Array3;
use rayon::ThreadPoolBuilder;
use thiserror::Error;
use tracing::{info, warn};
use web_time::Instant;

use crate::anisotropy::{ResolutionDistribution, finalize_field, occupancy_curve};
use crate::config::{AnalysisConfig, ConfigError};
use crate::directional::{ConeKernel, DirectionalEstimator, DirectionalFsc};
use crate::directions::DirectionSet;
use crate::filter::directional_filter;
use crate::fourier::{FourierTransformer, complete_spectrum, fftshift};
use crate::frequency::{FrequencyGrid, FrequencyGridError};
use crate::resolution::{ResolutionEstimate, ShellCurve};
use crate::shells::GlobalFsc;
use crate::volume::{Volume, VolumeError};

#[derive(Debug, Error)]
pub enum FsoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Half maps differ in shape: {half1:?} vs {half2:?}")]
    HalfShapeMismatch {
        half1: (usize, usize, usize),
        half2: (usize, usize, usize),
    },

    #[error("Mask does not fit the half maps: {0}")]
    Mask(#[from] VolumeError),

    #[error(transparent)]
    Grid(#[from] FrequencyGridError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Everything a directional resolution analysis produces.
#[derive(Debug, Clone)]
pub struct FsoResults {
    pub pixel_size: f64,
    pub global_fsc: ShellCurve,
    pub global_resolution: ResolutionEstimate,
    pub directional: Vec<DirectionalFsc>,
    /// Fraction of directions resolved per shell
    pub occupancy: ShellCurve,
    pub distribution: ResolutionDistribution,
    /// 3D FSC in half-spectrum layout (Z, Y, X/2+1)
    pub fsc_3d_half: Array3<f64>,
    /// 3D FSC in full layout with the origin at the centre
    pub fsc_3d_full: Array3<f64>,
    /// `-radius` reference sphere in full, centred layout
    pub frequency_sphere: Array3<f64>,
    pub filtered: Array3<f64>,
}

/// Directional FSC analysis of two half maps.
pub struct FsoAnalysis {
    config: AnalysisConfig,
}

impl FsoAnalysis {
    /// # Errors
    ///
    /// Returns a configuration error before any computation if `config` is invalid.
    pub fn new(config: AnalysisConfig) -> Result<Self, FsoError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the full analysis on a dedicated pool of `config.threads` workers.
    ///
    /// # Errors
    ///
    /// Fails if the halves or the mask differ in shape, if the volumes are
    /// empty, or if the worker pool cannot be created.
    pub fn run(
        &self,
        half1: Volume,
        half2: Volume,
        mask: Option<&Array3<f64>>,
    ) -> Result<FsoResults, FsoError> {
        if half1.dim() != half2.dim() {
            return Err(FsoError::HalfShapeMismatch {
                half1: half1.dim(),
                half2: half2.dim(),
            });
        }
        if let Some(mask) = mask.filter(|mask| mask.dim() != half1.dim()) {
            return Err(FsoError::Mask(VolumeError::ShapeMismatch {
                expected: half1.dim(),
                actual: mask.dim(),
            }));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()?;
        pool.install(|| self.run_in_pool(half1, half2, mask))
    }

    fn run_in_pool(
        &self,
        mut half1: Volume,
        mut half2: Volume,
        mask: Option<&Array3<f64>>,
    ) -> Result<FsoResults, FsoError> {
        let config = &self.config;
        let dim = half1.dim();
        let grid = FrequencyGrid::new(dim)?;

        if let Some(mask) = mask {
            if mask.iter().any(|&v| !(0.0..=1.0).contains(&v)) {
                warn!("mask has values outside [0, 1]");
            }
            half1.apply_mask(mask)?;
            half2.apply_mask(mask)?;
        }

        let started = Instant::now();
        let transformer = FourierTransformer::new(dim);
        let ft1 = transformer.forward(half1.data());
        let ft2 = transformer.forward(half2.data());
        drop((half1, half2));
        info!(?dim, elapsed = ?started.elapsed(), "Fourier transforms done");

        let started = Instant::now();
        let GlobalFsc { curve: global_fsc, packed } =
            GlobalFsc::compute(&grid, &ft1, &ft2, config.pixel_size);
        let global_resolution = global_fsc.resolution_at(config.threshold);
        info!(
            resolution = %global_resolution,
            threshold = config.threshold,
            elapsed = ?started.elapsed(),
            "global FSC"
        );

        let started = Instant::now();
        let directions = DirectionSet::geodesic(config.sampling);
        let kernel = ConeKernel::new(config.cone_angle_radians());
        let frequencies = grid.shell_frequencies(config.pixel_size);
        let estimator = DirectionalEstimator::new(&packed, &frequencies, kernel, config.threshold);
        let (directional, field) = estimator.estimate_parallel(&directions);
        let resolved = directional.iter().filter(|d| d.resolution.is_resolved()).count();
        info!(
            directions = directions.len(),
            resolved,
            cone_angle = config.cone_angle,
            elapsed = ?started.elapsed(),
            "directional FSC"
        );

        let started = Instant::now();
        let occupancy = occupancy_curve(&directional, &frequencies, config.threshold);
        let distribution = ResolutionDistribution::interpolate(&directional, &kernel);
        let fsc_3d_half = finalize_field(&field, &packed, &grid);
        let fsc_3d_full = fftshift(&complete_spectrum(&fsc_3d_half, dim));
        let frequency_sphere = fftshift(&complete_spectrum(&grid.frequency_sphere(), dim));
        let filtered = directional_filter(&transformer, &ft1, &ft2, &fsc_3d_half);
        info!(elapsed = ?started.elapsed(), "anisotropy and directional filter");

        Ok(FsoResults {
            pixel_size: config.pixel_size,
            global_fsc,
            global_resolution,
            directional,
            occupancy,
            distribution,
            fsc_3d_half,
            fsc_3d_full,
            frequency_sphere,
            filtered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::DirectionSampling;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_volume(dim: (usize, usize, usize), seed: u64) -> Array3<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array3::from_shape_fn(dim, |_| rng.random_range(-1.0..1.0))
    }

    #[test]
    fn identical_halves_are_fully_resolved_everywhere() {
        let dim = (64, 64, 64);
        let data = random_volume(dim, 42);
        let analysis = FsoAnalysis::new(AnalysisConfig::new(20.0).with_threads(2)).unwrap();
        let results = analysis
            .run(Volume::new(data.clone(), 1.0), Volume::new(data, 1.0), None)
            .unwrap();

        let last = *results.global_fsc.frequencies.last().unwrap();
        assert_eq!(
            results.global_resolution,
            ResolutionEstimate::NotResolved { limit_frequency: last }
        );
        assert_eq!(results.global_resolution.limit_frequency(), 0.5);
        assert!(results.occupancy.values.iter().all(|&v| v == 1.0));
        assert_eq!(results.directional.len(), 321);
        assert!(results.distribution.values.iter().all(|v| v.is_nan()));
        assert_eq!(results.fsc_3d_full.dim(), dim);
        assert_eq!(results.fsc_3d_half.dim(), (64, 64, 33));
    }

    #[test]
    fn shift_along_x_lowers_the_field_along_x() {
        let dim = (32, 32, 32);
        let half1 = random_volume(dim, 7);
        // Circular shift by one voxel along x.
        let half2 = Array3::from_shape_fn(dim, |(k, i, j)| half1[[k, i, (j + 1) % dim.2]]);
        let analysis = FsoAnalysis::new(AnalysisConfig::new(20.0)).unwrap();
        let results = analysis
            .run(Volume::new(half1, 1.0), Volume::new(half2, 1.0), None)
            .unwrap();

        // Voxels at radius 0.25 on the x and y axes.
        let along_x = results.fsc_3d_half[[0, 0, 8]];
        let along_y = results.fsc_3d_half[[0, 8, 0]];
        let along_z = results.fsc_3d_half[[8, 0, 0]];
        assert!(along_x < 0.5, "x: {along_x}");
        assert!(along_y > 0.7, "y: {along_y}");
        assert!(along_z > 0.7, "z: {along_z}");

        let x_axis = results
            .directional
            .iter()
            .find(|d| d.direction.unit_vector()[0] > 1.0 - 1e-9)
            .expect("x axis is a sampled direction");
        let z_axis = &results.directional[0];
        assert!(x_axis.resolution.is_resolved());
        assert!(
            x_axis.resolution.limit_frequency() < z_axis.resolution.limit_frequency()
        );
    }

    #[test]
    fn mask_and_half_shapes_are_checked() {
        let analysis = FsoAnalysis::new(AnalysisConfig::new(20.0)).unwrap();
        let err = analysis
            .run(
                Volume::new(Array3::zeros((4, 4, 4)), 1.0),
                Volume::new(Array3::zeros((4, 4, 5)), 1.0),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, FsoError::HalfShapeMismatch { .. }));

        let err = analysis
            .run(
                Volume::new(Array3::zeros((4, 4, 4)), 1.0),
                Volume::new(Array3::zeros((4, 4, 4)), 1.0),
                Some(&Array3::zeros((4, 4, 3))),
            )
            .unwrap_err();
        assert!(matches!(err, FsoError::Mask(_)));

        // Shapes are checked before the frequency grid rejects empty volumes.
        let err = analysis
            .run(
                Volume::new(Array3::zeros((0, 4, 4)), 1.0),
                Volume::new(Array3::zeros((0, 4, 4)), 1.0),
                Some(&Array3::zeros((4, 4, 4))),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            FsoError::Mask(VolumeError::ShapeMismatch {
                expected: (0, 4, 4),
                actual: (4, 4, 4)
            })
        ));
    }

    #[test]
    fn invalid_config_fails_before_running() {
        let err = FsoAnalysis::new(AnalysisConfig::new(120.0)).err().unwrap();
        assert!(matches!(
            err,
            FsoError::Config(ConfigError::InvalidConeAngle(_))
        ));
    }

    #[test]
    fn coarse_sampling_and_pixel_size_scale_frequencies() {
        let dim = (16, 16, 16);
        let half1 = random_volume(dim, 1);
        let half2 = random_volume(dim, 2);
        let config = AnalysisConfig::new(25.0)
            .with_pixel_size(2.0)
            .with_sampling(DirectionSampling::Coarse);
        let results = FsoAnalysis::new(config)
            .unwrap()
            .run(Volume::new(half1, 2.0), Volume::new(half2, 2.0), None)
            .unwrap();
        assert_eq!(results.directional.len(), 81);
        assert_abs_diff_eq!(*results.global_fsc.frequencies.last().unwrap(), 0.25);
        assert!(
            results
                .occupancy
                .values
                .iter()
                .all(|v| (0.0..=1.0).contains(v))
        );
        // Repaired half line mirrors its partner.
        assert_eq!(
            results.fsc_3d_half[[3, 12, 0]],
            results.fsc_3d_half[[13, 4, 0]]
        );
    }
}
