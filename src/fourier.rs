use std::sync::Arc;

use ndarray::{Array1, Array3, Axis, Zip, s};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::frequency::half_spectrum_dim;

/// Values that can be mirrored across the origin of a Hermitian spectrum.
pub trait HermitianMirror: Copy {
    fn mirrored(self) -> Self;
}

impl HermitianMirror for f64 {
    #[inline]
    fn mirrored(self) -> Self {
        self
    }
}

impl HermitianMirror for Complex64 {
    #[inline]
    fn mirrored(self) -> Self {
        self.conj()
    }
}

/// Real-to-half-spectrum 3D transforms on (Z, Y, X) volumes.
///
/// The X axis is transformed first and truncated to X/2+1 bins; the
/// remaining axes are transformed on the truncated array. Lanes are
/// processed on the current rayon pool.
pub struct FourierTransformer {
    dim: (usize, usize, usize),
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
}

impl FourierTransformer {
    pub fn new(dim: (usize, usize, usize)) -> Self {
        let mut planner = FftPlanner::new();
        let (zdim, ydim, xdim) = dim;
        Self {
            dim,
            forward: [
                planner.plan_fft_forward(zdim),
                planner.plan_fft_forward(ydim),
                planner.plan_fft_forward(xdim),
            ],
            inverse: [
                planner.plan_fft_inverse(zdim),
                planner.plan_fft_inverse(ydim),
                planner.plan_fft_inverse(xdim),
            ],
        }
    }

    /// Real-space dimensions this transformer was planned for.
    pub fn dim(&self) -> (usize, usize, usize) {
        self.dim
    }

    /// Unnormalised forward transform, shape (Z, Y, X/2+1).
    pub fn forward(&self, volume: &Array3<f64>) -> Array3<Complex64> {
        debug_assert_eq!(volume.dim(), self.dim);
        let mut full = volume.mapv(|value| Complex64::new(value, 0.0));
        Self::transform_lanes(&mut full, Axis(2), &self.forward[2]);

        let half_x = half_spectrum_dim(self.dim).2;
        let mut half = full.slice(s![.., .., ..half_x]).to_owned();
        Self::transform_lanes(&mut half, Axis(1), &self.forward[1]);
        Self::transform_lanes(&mut half, Axis(0), &self.forward[0]);
        half
    }

    /// Inverse of [`FourierTransformer::forward`], normalised by 1/(ZYX).
    ///
    /// Only the Hermitian-consistent part of the x = 0 and x = X/2 planes
    /// survives, as the imaginary part of the result is discarded.
    pub fn inverse(&self, spectrum: &Array3<Complex64>) -> Array3<f64> {
        let (zdim, ydim, xdim) = self.dim;
        debug_assert_eq!(spectrum.dim(), half_spectrum_dim(self.dim));
        let half_x = spectrum.dim().2;

        let mut half = spectrum.to_owned();
        Self::transform_lanes(&mut half, Axis(0), &self.inverse[0]);
        Self::transform_lanes(&mut half, Axis(1), &self.inverse[1]);

        // After the z and y passes every x row of a real signal is Hermitian on its own.
        let mut full = Array3::from_shape_fn(self.dim, |(k, i, j)| {
            if j < half_x {
                half[[k, i, j]]
            } else {
                half[[k, i, xdim - j]].conj()
            }
        });
        Self::transform_lanes(&mut full, Axis(2), &self.inverse[2]);

        let scale = 1.0 / (zdim * ydim * xdim) as f64;
        full.mapv(|value| value.re * scale)
    }

    fn transform_lanes(data: &mut Array3<Complex64>, axis: Axis, fft: &Arc<dyn Fft<f64>>) {
        Zip::from(data.lanes_mut(axis)).par_for_each(|mut lane| {
            let mut buffer: Vec<Complex64> = lane.to_vec();
            fft.process(&mut buffer);
            lane.assign(&Array1::from(buffer));
        });
    }
}

/// Expand a half spectrum (Z, Y, X/2+1) to the full (Z, Y, X) layout.
pub fn complete_spectrum<T: HermitianMirror>(
    half: &Array3<T>,
    dim: (usize, usize, usize),
) -> Array3<T> {
    let (zdim, ydim, xdim) = dim;
    let half_x = half.dim().2;
    Array3::from_shape_fn(dim, |(k, i, j)| {
        if j < half_x {
            half[[k, i, j]]
        } else {
            half[[(zdim - k) % zdim, (ydim - i) % ydim, xdim - j]].mirrored()
        }
    })
}

/// Move the zero frequency to the centre of every axis.
pub fn fftshift<T: Copy>(data: &Array3<T>) -> Array3<T> {
    let (zdim, ydim, xdim) = data.dim();
    Array3::from_shape_fn(data.dim(), |(k, i, j)| {
        data[[
            (k + zdim - zdim / 2) % zdim,
            (i + ydim - ydim / 2) % ydim,
            (j + xdim - xdim / 2) % xdim,
        ]]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_volume(dim: (usize, usize, usize), seed: u64) -> Array3<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array3::from_shape_fn(dim, |_| rng.random_range(-1.0..1.0))
    }

    #[test]
    fn forward_then_inverse_restores_volume() {
        for dim in [(6, 8, 10), (5, 7, 9)] {
            let volume = random_volume(dim, 7);
            let transformer = FourierTransformer::new(dim);
            let spectrum = transformer.forward(&volume);
            assert_eq!(spectrum.dim(), half_spectrum_dim(dim));

            let restored = transformer.inverse(&spectrum);
            for (a, b) in volume.iter().zip(restored.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn dc_term_is_sum_of_volume() {
        let volume = random_volume((4, 4, 4), 3);
        let spectrum = FourierTransformer::new((4, 4, 4)).forward(&volume);
        assert_abs_diff_eq!(spectrum[[0, 0, 0]].re, volume.sum(), epsilon = 1e-10);
        assert_abs_diff_eq!(spectrum[[0, 0, 0]].im, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn completed_spectrum_is_hermitian() {
        let dim = (8, 6, 10);
        let (zdim, ydim, xdim) = dim;
        let volume = random_volume(dim, 11);
        let half = FourierTransformer::new(dim).forward(&volume);
        let full = complete_spectrum(&half, dim);

        for ((k, i, j), value) in full.indexed_iter() {
            if j == 0 {
                continue;
            }
            let partner = full[[(zdim - k) % zdim, (ydim - i) % ydim, xdim - j]].conj();
            assert_abs_diff_eq!(value.re, partner.re, epsilon = 1e-9);
            assert_abs_diff_eq!(value.im, partner.im, epsilon = 1e-9);
        }

        // Centred, the spectrum is conjugate-symmetric about (Z/2, Y/2, X/2).
        let centred = fftshift(&full);
        assert_abs_diff_eq!(centred[[4, 3, 5]].re, volume.sum(), epsilon = 1e-9);
        for ((k, i, j), value) in centred.indexed_iter() {
            let mirror = centred[[(zdim - k) % zdim, (ydim - i) % ydim, (xdim - j) % xdim]].conj();
            assert_abs_diff_eq!(value.re, mirror.re, epsilon = 1e-9);
            assert_abs_diff_eq!(value.im, mirror.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn real_completion_mirrors_values() {
        let half = Array3::from_shape_fn((4, 4, 3), |(k, i, j)| (k * 100 + i * 10 + j) as f64);
        let full = complete_spectrum(&half, (4, 4, 4));
        assert_eq!(full[[0, 0, 3]], half[[0, 0, 1]]);
        assert_eq!(full[[1, 3, 3]], half[[3, 1, 1]]);
    }

    #[test]
    fn fftshift_moves_origin_to_centre() {
        let data = Array3::from_shape_fn((4, 4, 4), |(k, i, j)| (k * 16 + i * 4 + j) as f64);
        let shifted = fftshift(&data);
        assert_eq!(shifted[[2, 2, 2]], data[[0, 0, 0]]);
        assert_eq!(shifted[[3, 3, 3]], data[[1, 1, 1]]);

        let odd = Array3::from_shape_fn((3, 3, 3), |(k, i, j)| (k * 9 + i * 3 + j) as f64);
        assert_eq!(fftshift(&odd)[[1, 1, 1]], odd[[0, 0, 0]]);
    }
}
