use ndarray::{Array2, Array3};
use rayon::prelude::*;

use crate::directional::{AnisotropicField, ConeKernel, DirectionalFsc};
use crate::directions::Direction;
use crate::frequency::FrequencyGrid;
use crate::resolution::ShellCurve;
use crate::shells::PackedSpectrum;

/// Rotation samples of the resolution distribution, 1° apart.
pub const DISTRIBUTION_ROT_STEPS: usize = 360;

/// Tilt samples of the resolution distribution, 0° to 90° inclusive.
pub const DISTRIBUTION_TILT_STEPS: usize = 91;

/// Turn the accumulated field into a half-spectrum 3D FSC.
///
/// Voxels outside the Nyquist sphere are 0. Voxels dropped by the packer as
/// Hermitian duplicates take the value of their retained partner.
pub fn finalize_field(
    field: &AnisotropicField,
    packed: &PackedSpectrum,
    grid: &FrequencyGrid,
) -> Array3<f64> {
    let half_dim = grid.half_dim();
    let mut map = packed.unpack(&field.finalize(), half_dim, 0.0);

    let (zdim, ydim, _) = grid.volume_dim();
    for k in 0..half_dim.0 {
        for i in 0..half_dim.1 {
            let index = [k, i, 0];
            if grid.is_redundant(index) {
                let partner = [(zdim - k) % zdim, (ydim - i) % ydim, 0];
                map[index] = map[partner];
            }
        }
    }
    map
}

/// Fraction of directions whose FSC reaches `threshold` at every shell.
///
/// 0 means no direction resolved the shell, 1 means all of them did.
pub fn occupancy_curve(
    directional: &[DirectionalFsc],
    frequencies: &[f64],
    threshold: f64,
) -> ShellCurve {
    let mut counts = vec![0usize; frequencies.len()];
    for result in directional {
        for (count, &value) in counts.iter_mut().zip(&result.curve.values) {
            if value >= threshold {
                *count += 1;
            }
        }
    }
    let total = directional.len().max(1) as f64;
    ShellCurve::new(
        frequencies.to_vec(),
        counts.into_iter().map(|count| count as f64 / total).collect(),
    )
}

/// Directional resolution (Å) interpolated over a rot × tilt grid.
#[derive(Debug, Clone)]
pub struct ResolutionDistribution {
    /// Indexed `[rot_deg, tilt_deg]`; NaN where no resolved direction is in range
    pub values: Array2<f64>,
}

impl ResolutionDistribution {
    /// Cone-weighted average of the resolved directional resolutions around
    /// every grid node. Unresolved directions carry no value and are skipped.
    pub fn interpolate(directional: &[DirectionalFsc], kernel: &ConeKernel) -> Self {
        let samples: Vec<([f64; 3], f64)> = directional
            .iter()
            .filter_map(|result| {
                result
                    .resolution
                    .resolution()
                    .map(|resolution| (result.direction.unit_vector(), resolution))
            })
            .collect();

        let mut values = Array2::from_elem(
            (DISTRIBUTION_ROT_STEPS, DISTRIBUTION_TILT_STEPS),
            f64::NAN,
        );
        values
            .outer_iter_mut()
            .into_par_iter()
            .enumerate()
            .for_each(|(rot, mut row)| {
                for (tilt, value) in row.iter_mut().enumerate() {
                    let node = Direction::from_degrees(rot as f64, tilt as f64).unit_vector();
                    let (mut weighted, mut total) = (0.0, 0.0);
                    for (axis, resolution) in &samples {
                        let cosine =
                            (axis[0] * node[0] + axis[1] * node[1] + axis[2] * node[2]).abs();
                        if let Some(weight) = kernel.power_weight(cosine) {
                            weighted += weight * resolution;
                            total += weight;
                        }
                    }
                    if total > 0.0 {
                        *value = weighted / total;
                    }
                }
            });
        Self { values }
    }

    /// Rows of (rot°, tilt°, resolution Å).
    pub fn rows(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.values
            .indexed_iter()
            .map(|((rot, tilt), &value)| (rot, tilt, value))
    }
}
