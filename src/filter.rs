use ndarray::{Array3, Zip};
use num_complex::Complex64;

use crate::fourier::FourierTransformer;

/// Filter the summed halves with the half-spectrum 3D FSC as multiplier.
///
/// Directions and frequencies with a higher directional FSC pass through,
/// so the result is an anisotropy-aware low-pass of the full map.
pub fn directional_filter(
    transformer: &FourierTransformer,
    ft1: &Array3<Complex64>,
    ft2: &Array3<Complex64>,
    fsc_3d: &Array3<f64>,
) -> Array3<f64> {
    let mut combined = ft1 + ft2;
    Zip::from(&mut combined)
        .and(fsc_3d)
        .par_for_each(|value, &weight| *value *= weight);
    transformer.inverse(&combined)
}
