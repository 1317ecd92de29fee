use ndarray::Array3;
use num_complex::Complex64;
use tracing::debug;

use crate::frequency::FrequencyGrid;
use crate::resolution::ShellCurve;

/// Running correlation sums for every shell.
#[derive(Debug, Clone)]
pub(crate) struct ShellSums {
    pub(crate) num: Vec<f64>,
    pub(crate) den1: Vec<f64>,
    pub(crate) den2: Vec<f64>,
}

impl ShellSums {
    pub(crate) fn zeros(num_shells: usize) -> Self {
        Self {
            num: vec![0.0; num_shells],
            den1: vec![0.0; num_shells],
            den2: vec![0.0; num_shells],
        }
    }

    /// Add a coefficient pair scaled by the (power) weight `weight`.
    #[inline]
    pub(crate) fn add(&mut self, shell: usize, z1: Complex64, z2: Complex64, weight: f64) {
        self.num[shell] += (z1.conj() * z2).re * weight;
        self.den1[shell] += z1.norm_sqr() * weight;
        self.den2[shell] += z2.norm_sqr() * weight;
    }

    /// num / sqrt(den1 den2) per shell, `epsilon` guarding empty shells.
    pub(crate) fn correlation(&self, epsilon: f64) -> Vec<f64> {
        self.num
            .iter()
            .zip(self.den1.iter().zip(self.den2.iter()))
            .map(|(num, (den1, den2))| {
                (num + epsilon) / ((den1 * den2).sqrt() + epsilon)
            })
            .collect()
    }
}

/// Fourier coefficients of both halves packed contiguously by shell.
///
/// Entry `n` stores the two coefficients, the unit direction (x, y, z) of the
/// voxel's frequency vector, its shell and its (z, y, x) half-spectrum index.
/// Shell `s` occupies `offsets[s]..offsets[s + 1]`, the DC voxel is entry 0.
#[derive(Debug, Clone)]
pub struct PackedSpectrum {
    half1: Vec<Complex64>,
    half2: Vec<Complex64>,
    direction: Vec<[f64; 3]>,
    shell: Vec<usize>,
    voxel: Vec<[usize; 3]>,
    offsets: Vec<usize>,
    num_shells: usize,
}

impl PackedSpectrum {
    /// Counting sort of the retained voxels of `grid` into shell order and
    /// the global FSC sums accumulated on the way.
    pub(crate) fn pack(
        grid: &FrequencyGrid,
        ft1: &Array3<Complex64>,
        ft2: &Array3<Complex64>,
    ) -> (Self, ShellSums) {
        debug_assert_eq!(ft1.dim(), grid.half_dim());
        debug_assert_eq!(ft2.dim(), grid.half_dim());

        let counts = grid.shell_counts();
        let num_shells = counts.len();
        let mut offsets = Vec::with_capacity(num_shells + 1);
        let mut total = 0usize;
        offsets.push(total);
        for &count in counts {
            total += count;
            offsets.push(total);
        }

        let mut cursor = offsets[..num_shells].to_vec();
        let mut half1 = vec![Complex64::default(); total];
        let mut half2 = vec![Complex64::default(); total];
        let mut direction = vec![[0.0; 3]; total];
        let mut shell = vec![0usize; total];
        let mut voxel = vec![[0usize; 3]; total];
        let mut sums = ShellSums::zeros(num_shells);

        let (freq_z, freq_y, freq_x) = (grid.freq_z(), grid.freq_y(), grid.freq_x());
        for (index, radius, s) in grid.retained_voxels() {
            let n = cursor[s];
            cursor[s] += 1;

            let [k, i, j] = index;
            let (z1, z2) = (ft1[index], ft2[index]);
            half1[n] = z1;
            half2[n] = z2;
            shell[n] = s;
            voxel[n] = index;
            // The DC direction stays zero, see `PackedSpectrum::axial_cosine`.
            if index != [0, 0, 0] {
                direction[n] = [freq_x[j] / radius, freq_y[i] / radius, freq_z[k] / radius];
            }
            sums.add(s, z1, z2, 1.0);
        }
        debug_assert!(cursor.iter().zip(&offsets[1..]).all(|(c, end)| c == end));
        debug!(entries = total, shells = num_shells, "packed spectrum");

        let packed = Self {
            half1,
            half2,
            direction,
            shell,
            voxel,
            offsets,
            num_shells,
        };
        (packed, sums)
    }

    pub fn len(&self) -> usize {
        self.shell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shell.is_empty()
    }

    pub fn num_shells(&self) -> usize {
        self.num_shells
    }

    /// Range of packed entries belonging to `shell`.
    pub fn shell_range(&self, shell: usize) -> std::ops::Range<usize> {
        self.offsets[shell]..self.offsets[shell + 1]
    }

    #[inline]
    pub fn coefficients(&self, n: usize) -> (Complex64, Complex64) {
        (self.half1[n], self.half2[n])
    }

    #[inline]
    pub fn shell(&self, n: usize) -> usize {
        self.shell[n]
    }

    pub fn shells(&self) -> &[usize] {
        &self.shell
    }

    /// Half-spectrum index (z, y, x) of entry `n`.
    #[inline]
    pub fn voxel(&self, n: usize) -> [usize; 3] {
        self.voxel[n]
    }

    /// Unit direction (x, y, z) of entry `n`, zero for DC.
    #[inline]
    pub fn direction(&self, n: usize) -> [f64; 3] {
        self.direction[n]
    }

    /// |cos| of the angle between entry `n` and `axis`. DC lies on every axis.
    #[inline]
    pub fn axial_cosine(&self, n: usize, axis: &[f64; 3]) -> f64 {
        let [ux, uy, uz] = self.direction[n];
        if ux == 0.0 && uy == 0.0 && uz == 0.0 {
            return 1.0;
        }
        (ux * axis[0] + uy * axis[1] + uz * axis[2]).abs()
    }

    /// Scatter per-entry values back into a half spectrum, `fill` elsewhere.
    pub fn unpack(
        &self,
        values: &[f64],
        half_dim: (usize, usize, usize),
        fill: f64,
    ) -> Array3<f64> {
        debug_assert_eq!(values.len(), self.len());
        let mut out = Array3::from_elem(half_dim, fill);
        for (index, &value) in self.voxel.iter().zip(values) {
            out[*index] = value;
        }
        out
    }
}

/// Global FSC of two half spectra, the first stage of every analysis.
pub struct GlobalFsc {
    pub curve: ShellCurve,
    pub packed: PackedSpectrum,
}

impl GlobalFsc {
    pub fn compute(
        grid: &FrequencyGrid,
        ft1: &Array3<Complex64>,
        ft2: &Array3<Complex64>,
        pixel_size: f64,
    ) -> Self {
        let (packed, sums) = PackedSpectrum::pack(grid, ft1, ft2);
        let curve = ShellCurve::new(grid.shell_frequencies(pixel_size), sums.correlation(0.0));
        Self { curve, packed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fourier::FourierTransformer;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_volume(dim: (usize, usize, usize), rng: &mut StdRng) -> Array3<f64> {
        Array3::from_shape_fn(dim, |_| rng.random_range(-1.0..1.0))
    }

    fn spectra(
        dim: (usize, usize, usize),
        seed: u64,
        independent: bool,
    ) -> (FrequencyGrid, Array3<Complex64>, Array3<Complex64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let transformer = FourierTransformer::new(dim);
        let half1 = random_volume(dim, &mut rng);
        let half2 = if independent {
            random_volume(dim, &mut rng)
        } else {
            half1.clone()
        };
        let grid = FrequencyGrid::new(dim).unwrap();
        (
            grid,
            transformer.forward(&half1),
            transformer.forward(&half2),
        )
    }

    #[test]
    fn pack_orders_entries_by_shell() {
        let (grid, ft1, ft2) = spectra((12, 12, 12), 1, true);
        let (packed, _) = PackedSpectrum::pack(&grid, &ft1, &ft2);
        assert_eq!(packed.len(), grid.retained());
        assert_eq!(packed.voxel(0), [0, 0, 0]);

        for s in 0..packed.num_shells() {
            let range = packed.shell_range(s);
            assert_eq!(range.len(), grid.shell_counts()[s]);
            assert!(range.clone().all(|n| packed.shell(n) == s));
        }
        for n in 0..packed.len() {
            let voxel = packed.voxel(n);
            assert_eq!(grid.shell_at(voxel), Some(packed.shell(n)));
            assert_eq!(packed.coefficients(n).0, ft1[voxel]);
        }
    }

    #[test]
    fn directions_are_unit_vectors() {
        let (grid, ft1, ft2) = spectra((8, 10, 12), 2, true);
        let (packed, _) = PackedSpectrum::pack(&grid, &ft1, &ft2);
        for n in 1..packed.len() {
            let [x, y, z] = packed.direction(n);
            assert_abs_diff_eq!((x * x + y * y + z * z).sqrt(), 1.0, epsilon = 1e-9);
        }
        assert_eq!(packed.axial_cosine(0, &[0.0, 1.0, 0.0]), 1.0);
    }

    #[test]
    fn identical_halves_correlate_perfectly() {
        let (grid, ft1, ft2) = spectra((16, 16, 16), 3, false);
        let global = GlobalFsc::compute(&grid, &ft1, &ft2, 1.0);
        for value in &global.curve.values {
            assert_abs_diff_eq!(*value, 1.0, epsilon = 1e-12);
        }
        assert!(!global.curve.resolution_at(0.143).is_resolved());
    }

    #[test]
    fn independent_noise_decorrelates() {
        for seed in 0..4 {
            let (grid, ft1, ft2) = spectra((24, 24, 24), 100 + seed, true);
            let global = GlobalFsc::compute(&grid, &ft1, &ft2, 1.0);
            for value in &global.curve.values[6..] {
                assert!(value.abs() < 0.3, "seed {seed}: fsc {value}");
            }
        }
    }

    #[test]
    fn unpack_places_values_at_voxels() {
        let (grid, ft1, ft2) = spectra((6, 6, 6), 4, true);
        let (packed, _) = PackedSpectrum::pack(&grid, &ft1, &ft2);
        let values: Vec<f64> = (0..packed.len()).map(|n| n as f64).collect();
        let unpacked = packed.unpack(&values, grid.half_dim(), -1.0);
        assert_eq!(unpacked[[0, 0, 0]], 0.0);
        let n = packed.len() - 1;
        assert_eq!(unpacked[packed.voxel(n)], n as f64);
        assert_eq!(unpacked[[3, 3, 3]], -1.0);
    }
}
