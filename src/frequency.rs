use ndarray::Array3;
use thiserror::Error;

/// Placeholder stored at index 0 of every frequency axis so reciprocals stay finite.
pub const ZERO_FREQUENCY: f64 = 1e-38;

/// Reciprocal radius written for voxels outside the Nyquist sphere or
/// redundant under Hermitian symmetry. Nyquist is 2 px, 1.9 is beyond it.
pub const EXCLUDED_VOXEL: f64 = 1.9;

/// Reciprocal radius written at the DC voxel.
pub const DC_VOXEL: f64 = 1e38;

/// Largest radius (cycles/pixel) that takes part in any shell.
pub const MAX_FREQUENCY: f64 = 0.5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrequencyGridError {
    #[error("Volume dimensions must be non-zero, got {0:?}")]
    EmptyVolume((usize, usize, usize)),
}

/// Digital frequency of Fourier index `index` for a transform of length `size`.
pub fn index_to_digital_frequency(index: usize, size: usize) -> f64 {
    if size <= 1 {
        return 0.0;
    }
    if index <= size / 2 {
        index as f64 / size as f64
    } else {
        (index as f64 - size as f64) / size as f64
    }
}

/// Frequency bookkeeping of a half spectrum with shape (Z, Y, X/2+1).
///
/// Built once per run from the real-space dimensions and shared read-only
/// by the packer, the directional passes and the aggregator.
#[derive(Debug, Clone)]
pub struct FrequencyGrid {
    volume_dim: (usize, usize, usize),
    freq_z: Vec<f64>,
    freq_y: Vec<f64>,
    freq_x: Vec<f64>,
    inverse_radius: Array3<f64>,
    shell_counts: Vec<usize>,
    retained: usize,
}

impl FrequencyGrid {
    /// Scan every half-spectrum voxel once (Z outer, Y, X inner).
    ///
    /// # Errors
    ///
    /// Returns an error if any dimension of `volume_dim` is zero.
    pub fn new(volume_dim: (usize, usize, usize)) -> Result<Self, FrequencyGridError> {
        let (zdim, ydim, xdim) = volume_dim;
        if zdim == 0 || ydim == 0 || xdim == 0 {
            return Err(FrequencyGridError::EmptyVolume(volume_dim));
        }
        let half_dim = half_spectrum_dim(volume_dim);

        let freq_z = Self::axis(half_dim.0, zdim);
        let freq_y = Self::axis(half_dim.1, ydim);
        let freq_x = Self::axis(half_dim.2, xdim);

        let mut inverse_radius = Array3::from_elem(half_dim, EXCLUDED_VOXEL);
        let mut shell_counts = vec![0usize; shell_count(xdim)];
        let mut retained = 0usize;

        for (k, &uz) in freq_z.iter().enumerate() {
            let uz2 = uz * uz;
            for (i, &uy) in freq_y.iter().enumerate() {
                let uz2y2 = uz2 + uy * uy;
                for (j, &ux) in freq_x.iter().enumerate() {
                    let radius = (uz2y2 + ux * ux).sqrt();
                    if radius > MAX_FREQUENCY {
                        continue;
                    }
                    if Self::redundant(i, j, uy, uz) {
                        continue;
                    }
                    let value = if k == 0 && i == 0 && j == 0 {
                        DC_VOXEL
                    } else {
                        1.0 / radius
                    };
                    inverse_radius[[k, i, j]] = value;
                    shell_counts[shell_index(radius, xdim)] += 1;
                    retained += 1;
                }
            }
        }

        Ok(Self {
            volume_dim,
            freq_z,
            freq_y,
            freq_x,
            inverse_radius,
            shell_counts,
            retained,
        })
    }

    fn axis(len: usize, size: usize) -> Vec<f64> {
        (0..len)
            .map(|index| match index {
                0 => ZERO_FREQUENCY,
                _ => index_to_digital_frequency(index, size),
            })
            .collect()
    }

    // One copy of each conjugate pair on the x = 0 plane is dropped.
    #[inline]
    fn redundant(i: usize, j: usize, uy: f64, uz: f64) -> bool {
        (j == 0 && uy < 0.0) || (i == 0 && j == 0 && uz < 0.0)
    }

    /// Real-space dimensions (Z, Y, X)
    pub fn volume_dim(&self) -> (usize, usize, usize) {
        self.volume_dim
    }

    /// Half-spectrum dimensions (Z, Y, X/2+1)
    pub fn half_dim(&self) -> (usize, usize, usize) {
        self.inverse_radius.dim()
    }

    pub fn freq_z(&self) -> &[f64] {
        &self.freq_z
    }

    pub fn freq_y(&self) -> &[f64] {
        &self.freq_y
    }

    pub fn freq_x(&self) -> &[f64] {
        &self.freq_x
    }

    /// Reciprocal radius map with sentinels, see [`EXCLUDED_VOXEL`] and [`DC_VOXEL`].
    pub fn inverse_radius(&self) -> &Array3<f64> {
        &self.inverse_radius
    }

    /// Number of retained voxels per shell.
    pub fn shell_counts(&self) -> &[usize] {
        &self.shell_counts
    }

    pub fn num_shells(&self) -> usize {
        self.shell_counts.len()
    }

    /// Total number of retained (non-redundant, radius <= 0.5) voxels.
    pub fn retained(&self) -> usize {
        self.retained
    }

    /// Radius recomputed from the axis tables, bit-identical to the scan in [`FrequencyGrid::new`].
    #[inline]
    pub fn voxel_radius(&self, [k, i, j]: [usize; 3]) -> f64 {
        let uz = self.freq_z[k];
        let uy = self.freq_y[i];
        let ux = self.freq_x[j];
        let uz2y2 = uz * uz + uy * uy;
        (uz2y2 + ux * ux).sqrt()
    }

    /// Radius of a retained voxel, `None` for excluded ones.
    pub fn radius_at(&self, index: [usize; 3]) -> Option<f64> {
        (self.inverse_radius[index] != EXCLUDED_VOXEL).then(|| self.voxel_radius(index))
    }

    /// Shell index of a retained voxel.
    pub fn shell_at(&self, index: [usize; 3]) -> Option<usize> {
        self.radius_at(index)
            .map(|radius| shell_index(radius, self.volume_dim.2))
    }

    /// Retained voxels in Z, Y, X order with their radius and shell.
    pub fn retained_voxels(&self) -> impl Iterator<Item = ([usize; 3], f64, usize)> + '_ {
        let xdim = self.volume_dim.2;
        self.inverse_radius
            .indexed_iter()
            .filter(|&(_, &inverse)| inverse != EXCLUDED_VOXEL)
            .map(move |((k, i, j), _)| {
                let radius = self.voxel_radius([k, i, j]);
                ([k, i, j], radius, shell_index(radius, xdim))
            })
    }

    /// Whether the voxel was dropped because its Hermitian partner is retained.
    pub fn is_redundant(&self, [k, i, j]: [usize; 3]) -> bool {
        Self::redundant(i, j, self.freq_y[i], self.freq_z[k])
    }

    /// Spatial frequency (1/Å) of every shell for the given pixel size.
    pub fn shell_frequencies(&self, pixel_size: f64) -> Vec<f64> {
        let xdim = self.volume_dim.2 as f64;
        (0..self.num_shells())
            .map(|shell| shell as f64 / (xdim * pixel_size))
            .collect()
    }

    /// Half spectrum holding `-radius` for retained voxels, the frequency
    /// sphere reference written next to the 3D FSC.
    pub fn frequency_sphere(&self) -> Array3<f64> {
        let mut sphere = Array3::zeros(self.half_dim());
        for (index, radius, _) in self.retained_voxels() {
            sphere[index] = -radius;
        }
        sphere
    }
}

/// Half-spectrum shape of a real volume of shape (Z, Y, X).
pub fn half_spectrum_dim((zdim, ydim, xdim): (usize, usize, usize)) -> (usize, usize, usize) {
    (zdim, ydim, xdim / 2 + 1)
}

/// Number of shells for an X dimension, the largest index being round(X/2).
pub fn shell_count(xdim: usize) -> usize {
    (xdim as f64 * MAX_FREQUENCY).round() as usize + 1
}

#[inline]
pub fn shell_index(radius: f64, xdim: usize) -> usize {
    (radius * xdim as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn digital_frequency_even_and_odd() {
        assert_abs_diff_eq!(index_to_digital_frequency(1, 4), 0.25);
        assert_abs_diff_eq!(index_to_digital_frequency(2, 4), 0.5);
        assert_abs_diff_eq!(index_to_digital_frequency(3, 4), -0.25);
        assert_abs_diff_eq!(index_to_digital_frequency(2, 5), 0.4);
        assert_abs_diff_eq!(index_to_digital_frequency(3, 5), -0.4);
    }

    #[test]
    fn rejects_empty_volume() {
        assert_eq!(
            FrequencyGrid::new((0, 4, 4)).unwrap_err(),
            FrequencyGridError::EmptyVolume((0, 4, 4))
        );
    }

    #[test]
    fn axes_use_placeholder_at_zero() {
        let grid = FrequencyGrid::new((8, 6, 10)).unwrap();
        assert_eq!(grid.half_dim(), (8, 6, 6));
        assert_eq!(grid.freq_z()[0], ZERO_FREQUENCY);
        assert_eq!(grid.freq_y()[0], ZERO_FREQUENCY);
        assert_eq!(grid.freq_x()[0], ZERO_FREQUENCY);
        assert_abs_diff_eq!(grid.freq_y()[4], -1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(grid.freq_x()[5], 0.5);
    }

    #[test]
    fn shell_counts_sum_to_retained() {
        let grid = FrequencyGrid::new((16, 16, 16)).unwrap();
        assert_eq!(grid.num_shells(), 9);
        assert_eq!(grid.shell_counts().iter().sum::<usize>(), grid.retained());
        assert_eq!(grid.shell_counts()[0], 1);
        assert_eq!(grid.inverse_radius()[[0, 0, 0]], DC_VOXEL);
    }

    #[test]
    fn odd_dimension_keeps_last_shell_in_range() {
        let grid = FrequencyGrid::new((5, 5, 5)).unwrap();
        assert_eq!(grid.num_shells(), 4);
        assert_eq!(grid.shell_counts().iter().sum::<usize>(), grid.retained());
    }

    #[test]
    fn redundant_voxels_have_retained_partner() {
        let (zdim, ydim) = (8, 8);
        let grid = FrequencyGrid::new((zdim, ydim, 8)).unwrap();
        for k in 0..zdim {
            for i in 0..ydim {
                let index = [k, i, 0];
                if !grid.is_redundant(index) {
                    continue;
                }
                assert_eq!(grid.inverse_radius()[index], EXCLUDED_VOXEL);
                let partner = [(zdim - k) % zdim, (ydim - i) % ydim, 0];
                assert!(!grid.is_redundant(partner), "{index:?} -> {partner:?}");
            }
        }
        // Nothing is dropped away from the x = 0 plane.
        assert!(!grid.is_redundant([3, 5, 1]));
        assert!(grid.is_redundant([5, 0, 0]));
        assert!(!grid.is_redundant([3, 0, 0]));
    }

    #[test]
    fn finite_entries_lie_inside_nyquist() {
        let grid = FrequencyGrid::new((12, 10, 8)).unwrap();
        let retained = grid
            .inverse_radius()
            .indexed_iter()
            .filter(|&((k, i, j), _)| grid.radius_at([k, i, j]).is_some())
            .count();
        assert_eq!(retained, grid.retained());
        assert!(grid.radius_at([0, 0, 4]).is_some());
        assert!(grid.radius_at([6, 5, 4]).is_none());
    }

    #[test]
    fn shell_frequencies_follow_pixel_size() {
        let grid = FrequencyGrid::new((10, 10, 10)).unwrap();
        let frequencies = grid.shell_frequencies(2.0);
        assert_eq!(frequencies.len(), 6);
        assert_abs_diff_eq!(frequencies[5], 0.25);
    }
}
