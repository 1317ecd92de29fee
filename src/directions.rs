use std::collections::HashMap;
use std::f64::consts::PI;

use serde::Serialize;

use crate::enums::DirectionSampling;

// Below this a coordinate is treated as zero when picking the hemisphere.
const HEMISPHERE_TOLERANCE: f64 = 1e-9;

/// A sampled direction on the frequency hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Direction {
    /// Rotation in radians
    pub rot: f64,
    /// Tilt in radians
    pub tilt: f64,
}

impl Direction {
    pub fn new(rot: f64, tilt: f64) -> Self {
        Self { rot, tilt }
    }

    pub fn from_degrees(rot: f64, tilt: f64) -> Self {
        Self::new(rot.to_radians(), tilt.to_radians())
    }

    fn from_unit_vector([x, y, z]: [f64; 3]) -> Self {
        Self::new(y.atan2(x).rem_euclid(2.0 * PI), z.clamp(-1.0, 1.0).acos())
    }

    /// Unit vector (x, y, z) = (sin tilt cos rot, sin tilt sin rot, cos tilt)
    pub fn unit_vector(&self) -> [f64; 3] {
        let (sin_tilt, cos_tilt) = self.tilt.sin_cos();
        let (sin_rot, cos_rot) = self.rot.sin_cos();
        [sin_tilt * cos_rot, sin_tilt * sin_rot, cos_tilt]
    }
}

/// Fixed, deterministic set of directions covering the hemisphere.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionSet {
    directions: Vec<Direction>,
}

impl DirectionSet {
    /// Geodesic sampling: one vertex of every antipodal pair of a subdivided,
    /// pole-aligned icosahedron. Coarse gives 81 directions, fine 321.
    pub fn geodesic(sampling: DirectionSampling) -> Self {
        let subdivisions = match sampling {
            DirectionSampling::Coarse => 2,
            DirectionSampling::Fine => 3,
        };
        let directions = GeodesicSphere::icosahedron()
            .subdivided(subdivisions)
            .vertices
            .into_iter()
            .filter(|&vertex| in_hemisphere(vertex))
            .map(Direction::from_unit_vector)
            .collect();
        Self { directions }
    }

    /// Directions from explicit (rot, tilt) pairs in degrees.
    pub fn from_degrees(angles: &[(f64, f64)]) -> Self {
        Self {
            directions: angles
                .iter()
                .map(|&(rot, tilt)| Direction::from_degrees(rot, tilt))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Direction> {
        self.directions.iter()
    }

    pub fn as_slice(&self) -> &[Direction] {
        &self.directions
    }
}

impl<'a> IntoIterator for &'a DirectionSet {
    type Item = &'a Direction;
    type IntoIter = std::slice::Iter<'a, Direction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn in_hemisphere([x, y, z]: [f64; 3]) -> bool {
    if z.abs() > HEMISPHERE_TOLERANCE {
        return z > 0.0;
    }
    if y.abs() > HEMISPHERE_TOLERANCE {
        return y > 0.0;
    }
    x > 0.0
}

struct GeodesicSphere {
    vertices: Vec<[f64; 3]>,
    faces: Vec<[usize; 3]>,
}

impl GeodesicSphere {
    /// Icosahedron with vertices on the z poles and two rings of five at
    /// tilt atan(2), the upper ring starting at rot 36°.
    fn icosahedron() -> Self {
        let ring_tilt = 2f64.atan();
        let ring =
            |tilt: f64, rot_deg: f64| Direction::new(rot_deg.to_radians(), tilt).unit_vector();

        let mut vertices = vec![[0.0, 0.0, 1.0]];
        vertices.extend((0..5).map(|k| ring(ring_tilt, 36.0 + 72.0 * k as f64)));
        vertices.extend((0..5).map(|k| ring(PI - ring_tilt, 72.0 * k as f64)));
        vertices.push([0.0, 0.0, -1.0]);

        let (top, bottom) = (0, 11);
        let upper = |k: usize| 1 + k % 5;
        let lower = |k: usize| 6 + k % 5;
        let mut faces = Vec::with_capacity(20);
        for k in 0..5 {
            faces.push([top, upper(k), upper(k + 1)]);
            faces.push([upper(k), lower(k + 1), upper(k + 1)]);
            faces.push([lower(k), lower(k + 1), upper(k)]);
            faces.push([bottom, lower(k + 1), lower(k)]);
        }
        Self { vertices, faces }
    }

    fn subdivided(mut self, times: usize) -> Self {
        for _ in 0..times {
            self = self.subdivide();
        }
        self
    }

    // Split every face in four, new vertices projected onto the sphere.
    fn subdivide(self) -> Self {
        let Self {
            mut vertices,
            faces,
        } = self;
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<[f64; 3]>| -> usize {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                let (p, q) = (vertices[a], vertices[b]);
                let m = [p[0] + q[0], p[1] + q[1], p[2] + q[2]];
                let norm = (m[0] * m[0] + m[1] * m[1] + m[2] * m[2]).sqrt();
                vertices.push([m[0] / norm, m[1] / norm, m[2] / norm]);
                vertices.len() - 1
            })
        };

        let mut next = Vec::with_capacity(faces.len() * 4);
        for [a, b, c] in faces {
            let ab = midpoint(a, b, &mut vertices);
            let bc = midpoint(b, c, &mut vertices);
            let ca = midpoint(c, a, &mut vertices);
            next.extend([[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }
        Self {
            vertices,
            faces: next,
        }
    }
}
