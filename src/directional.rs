use rayon::prelude::*;
use tracing::debug;

use crate::directions::{Direction, DirectionSet};
use crate::resolution::{ResolutionEstimate, ShellCurve};
use crate::shells::{PackedSpectrum, ShellSums};

/// Guards the directional FSC against empty shells.
pub const FSC_EPSILON: f64 = 1e-38;

/// Smooth angular falloff restricted to a cone of half-angle `half_angle`.
///
/// The amplitude weight is exp(-(c-1)² aux) with aux = 2/(cos α - 1)²; every
/// consumer uses its square, exp(-4(c-1)²/(cos α - 1)²).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeKernel {
    half_angle: f64,
    cos_angle: f64,
    aux: f64,
}

impl ConeKernel {
    /// `half_angle` in radians
    pub fn new(half_angle: f64) -> Self {
        let cos_angle = half_angle.cos();
        let aux = 2.0 / ((cos_angle - 1.0) * (cos_angle - 1.0));
        Self {
            half_angle,
            cos_angle,
            aux,
        }
    }

    pub fn half_angle(&self) -> f64 {
        self.half_angle
    }

    pub fn cos_angle(&self) -> f64 {
        self.cos_angle
    }

    /// Amplitude weight for |cos| `cosine`, `None` outside the cone.
    #[inline]
    pub fn weight(&self, cosine: f64) -> Option<f64> {
        if cosine < self.cos_angle {
            return None;
        }
        let d = cosine - 1.0;
        Some((-d * d * self.aux).exp())
    }

    /// Squared weight, the factor applied to powers and to scattered values.
    #[inline]
    pub fn power_weight(&self, cosine: f64) -> Option<f64> {
        self.weight(cosine).map(|w| w * w)
    }
}

/// Per-voxel accumulators of the 3D FSC, indexed like the packed spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct AnisotropicField {
    pub weighted_fsc_sum: Vec<f64>,
    pub weight_sum: Vec<f64>,
}

impl AnisotropicField {
    pub fn zeros(len: usize) -> Self {
        Self {
            weighted_fsc_sum: vec![0.0; len],
            weight_sum: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.weight_sum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weight_sum.is_empty()
    }

    /// Element-wise sum of two partial fields.
    pub fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.weighted_fsc_sum.iter_mut().zip(other.weighted_fsc_sum) {
            *a += b;
        }
        for (a, b) in self.weight_sum.iter_mut().zip(other.weight_sum) {
            *a += b;
        }
        self
    }

    /// weighted_fsc_sum / weight_sum, 1.0 where nothing was scattered.
    pub fn finalize(&self) -> Vec<f64> {
        self.weighted_fsc_sum
            .iter()
            .zip(&self.weight_sum)
            .map(|(&sum, &weight)| {
                if weight > 0.0 { sum / weight } else { 1.0 }
            })
            .collect()
    }
}

/// FSC measured inside the cone around one direction.
#[derive(Debug, Clone)]
pub struct DirectionalFsc {
    pub direction: Direction,
    pub curve: ShellCurve,
    pub resolution: ResolutionEstimate,
    /// Packed entries that fell inside the cone
    pub occupancy: usize,
}

/// Cone-weighted FSC along every direction of a [`DirectionSet`].
pub struct DirectionalEstimator<'a> {
    packed: &'a PackedSpectrum,
    frequencies: &'a [f64],
    kernel: ConeKernel,
    threshold: f64,
}

impl<'a> DirectionalEstimator<'a> {
    pub fn new(
        packed: &'a PackedSpectrum,
        frequencies: &'a [f64],
        kernel: ConeKernel,
        threshold: f64,
    ) -> Self {
        debug_assert_eq!(packed.num_shells(), frequencies.len());
        Self {
            packed,
            frequencies,
            kernel,
            threshold,
        }
    }

    /// One directional pass, scattering its curve into `field`.
    pub fn estimate(&self, direction: Direction, field: &mut AnisotropicField) -> DirectionalFsc {
        let axis = direction.unit_vector();
        let mut sums = ShellSums::zeros(self.packed.num_shells());
        let mut touched: Vec<(usize, f64)> = Vec::new();

        for n in 0..self.packed.len() {
            let cosine = self.packed.axial_cosine(n, &axis);
            let Some(power) = self.kernel.power_weight(cosine) else {
                continue;
            };
            let (z1, z2) = self.packed.coefficients(n);
            sums.add(self.packed.shell(n), z1, z2, power);
            touched.push((n, power));
        }

        let curve = ShellCurve::new(self.frequencies.to_vec(), sums.correlation(FSC_EPSILON));
        let resolution = curve.resolution_at(self.threshold);

        for &(n, power) in &touched {
            field.weighted_fsc_sum[n] += power * curve.values[self.packed.shell(n)];
            field.weight_sum[n] += power;
        }

        DirectionalFsc {
            direction,
            curve,
            resolution,
            occupancy: touched.len(),
        }
    }

    /// Directions run sequentially into a single field.
    pub fn estimate_sequential(
        &self,
        directions: &DirectionSet,
    ) -> (Vec<DirectionalFsc>, AnisotropicField) {
        let mut field = AnisotropicField::zeros(self.packed.len());
        let results = directions
            .iter()
            .enumerate()
            .map(|(k, &direction)| {
                let result = self.estimate(direction, &mut field);
                debug!(direction = k, resolution = %result.resolution, "directional FSC");
                result
            })
            .collect();
        (results, field)
    }

    /// Directions run on the rayon pool in one contiguous chunk per worker
    /// thread. Each chunk scatters into a private field and the partial
    /// fields are summed afterwards, so at most one field per thread is alive.
    pub fn estimate_parallel(
        &self,
        directions: &DirectionSet,
    ) -> (Vec<DirectionalFsc>, AnisotropicField) {
        let len = self.packed.len();
        let chunk = chunk_len(directions.len(), rayon::current_num_threads());
        directions
            .as_slice()
            .par_chunks(chunk)
            .enumerate()
            .map(|(c, chunk_directions)| {
                let mut field = AnisotropicField::zeros(len);
                let results = chunk_directions
                    .iter()
                    .enumerate()
                    .map(|(offset, &direction)| {
                        let result = self.estimate(direction, &mut field);
                        debug!(
                            direction = c * chunk + offset,
                            resolution = %result.resolution,
                            "directional FSC"
                        );
                        result
                    })
                    .collect::<Vec<_>>();
                (results, field)
            })
            .reduce_with(|(mut left, left_field), (right, right_field)| {
                left.extend(right);
                (left, left_field.merge(right_field))
            })
            .unwrap_or_else(|| (Vec::new(), AnisotropicField::zeros(len)))
    }
}

/// Directions per chunk so that `total` splits into at most `workers` chunks.
fn chunk_len(total: usize, workers: usize) -> usize {
    total.div_ceil(workers.max(1)).max(1)
}
