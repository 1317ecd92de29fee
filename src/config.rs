use serde::Serialize;
use thiserror::Error;

use crate::enums::DirectionSampling;
use crate::resolution::DEFAULT_THRESHOLD;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("A cone angle is required for the directional analysis")]
    MissingConeAngle,

    #[error("Cone angle must lie in (0, 90) degrees, got {0}")]
    InvalidConeAngle(f64),

    #[error("Pixel size must be positive, got {0}")]
    InvalidPixelSize(f64),

    #[error("FSC threshold must lie in (0, 1), got {0}")]
    InvalidThreshold(f64),

    #[error("At least one worker thread is required")]
    NoThreads,
}

/// Validated parameters of a directional resolution analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisConfig {
    /// Ångström per pixel
    pub pixel_size: f64,
    /// Cone half-angle in degrees
    pub cone_angle: f64,
    pub threshold: f64,
    pub sampling: DirectionSampling,
    pub threads: usize,
}

impl AnalysisConfig {
    /// Config with the conventional defaults for everything but the cone angle.
    pub fn new(cone_angle: f64) -> Self {
        Self {
            pixel_size: 1.0,
            cone_angle,
            threshold: DEFAULT_THRESHOLD,
            sampling: DirectionSampling::default(),
            threads: 1,
        }
    }

    /// Build from optional values as they arrive from the command line.
    pub fn from_parts(
        cone_angle: Option<f64>,
        pixel_size: f64,
        threshold: f64,
        sampling: DirectionSampling,
        threads: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            pixel_size,
            cone_angle: cone_angle.ok_or(ConfigError::MissingConeAngle)?,
            threshold,
            sampling,
            threads,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_pixel_size(mut self, pixel_size: f64) -> Self {
        self.pixel_size = pixel_size;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_sampling(mut self, sampling: DirectionSampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cone_angle > 0.0 && self.cone_angle < 90.0) {
            return Err(ConfigError::InvalidConeAngle(self.cone_angle));
        }
        if !(self.pixel_size > 0.0 && self.pixel_size.is_finite()) {
            return Err(ConfigError::InvalidPixelSize(self.pixel_size));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        if self.threads == 0 {
            return Err(ConfigError::NoThreads);
        }
        Ok(())
    }

    /// Cone half-angle in radians
    pub fn cone_angle_radians(&self) -> f64 {
        self.cone_angle.to_radians()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cone_angle_is_a_config_error() {
        let err =
            AnalysisConfig::from_parts(None, 1.0, 0.143, DirectionSampling::Fine, 1).unwrap_err();
        assert_eq!(err, ConfigError::MissingConeAngle);
    }

    #[test]
    fn defaults_are_conventional() {
        let config = AnalysisConfig::new(20.0);
        assert_eq!(config.pixel_size, 1.0);
        assert_eq!(config.threshold, 0.143);
        assert_eq!(config.sampling, DirectionSampling::Fine);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let base = AnalysisConfig::new(20.0);
        assert_eq!(
            AnalysisConfig::new(0.0).validate(),
            Err(ConfigError::InvalidConeAngle(0.0))
        );
        assert_eq!(
            base.clone().with_pixel_size(-1.0).validate(),
            Err(ConfigError::InvalidPixelSize(-1.0))
        );
        assert_eq!(
            base.clone().with_threshold(1.5).validate(),
            Err(ConfigError::InvalidThreshold(1.5))
        );
        assert_eq!(base.with_threads(0).validate(), Err(ConfigError::NoThreads));
    }
}
