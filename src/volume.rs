use crate::enums::Orientation;

use image::ImageBuffer;
use image::Luma;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::Zip;
use ndarray::s;
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum VolumeError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
}

#[derive(Debug, Clone, Default)]
pub struct Volume {
    pub data: Array3<f64>,
    /// Ångström per pixel
    pub pixel_size: f64,
}

impl Volume {
    pub fn new(data: Array3<f64>, pixel_size: f64) -> Self {
        Self { data, pixel_size }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<f64> {
        &mut self.data
    }

    /// Multiply the volume element-wise by `mask`.
    pub fn apply_mask(&mut self, mask: &Array3<f64>) -> Result<(), VolumeError> {
        if mask.dim() != self.dim() {
            return Err(VolumeError::ShapeMismatch {
                expected: self.dim(),
                actual: mask.dim(),
            });
        }
        Zip::from(&mut self.data)
            .and(mask)
            .par_for_each(|value, &weight| *value *= weight);
        Ok(())
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: &Orientation,
    ) -> Option<ArrayView2<'_, f64>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let slice_result = match orientation {
            Orientation::Axial => self.data().slice(s![index, .., ..]),
            Orientation::Coronal => self.data().slice(s![.., index, ..]),
            Orientation::Sagittal => self.data().slice(s![.., .., index]),
        };
        Some(slice_result)
    }

    /// Central slice along `orientation` as an 8-bit image, min/max stretched.
    pub fn get_center_image(
        &self,
        orientation: Orientation,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let dim = self.dim();
        let index = match orientation {
            Orientation::Axial => dim.0 / 2,
            Orientation::Coronal => dim.1 / 2,
            Orientation::Sagittal => dim.2 / 2,
        };
        let slice = self.get_slice_from_axis(index, &orientation)?;
        Self::slice_to_image(&slice)
    }

    // Extract slice to image conversion
    pub(crate) fn slice_to_image(
        slice: &ArrayView2<'_, f64>,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (height, width) = slice.dim();
        let (min, max) = slice
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = if max > min { max - min } else { 1.0 };

        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v, min, range))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    #[inline]
    fn normalize_to_u8(value: f64, min: f64, range: f64) -> u8 {
        if !value.is_finite() {
            return 0;
        }
        (((value - min) / range) * 255.0).clamp(0.0, 255.0) as u8
    }

    fn is_valid_index(&self, index: usize, orientation: &Orientation) -> bool {
        let dim = self.data.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        };
        index < max_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_multiplies_elementwise() {
        let mut volume = Volume::new(Array3::from_elem((2, 3, 4), 2.0), 1.0);
        let mut mask = Array3::zeros((2, 3, 4));
        mask[[1, 2, 3]] = 0.5;
        volume.apply_mask(&mask).unwrap();
        assert_eq!(volume.data()[[1, 2, 3]], 1.0);
        assert_eq!(volume.data()[[0, 0, 0]], 0.0);
    }

    #[test]
    fn mask_shape_must_match() {
        let mut volume = Volume::new(Array3::zeros((2, 3, 4)), 1.0);
        let err = volume.apply_mask(&Array3::zeros((2, 3, 3))).unwrap_err();
        assert_eq!(
            err,
            VolumeError::ShapeMismatch {
                expected: (2, 3, 4),
                actual: (2, 3, 3)
            }
        );
    }

    #[test]
    fn slices_follow_orientation() {
        let data = Array3::from_shape_fn((2, 3, 4), |(k, i, j)| (k * 100 + i * 10 + j) as f64);
        let volume = Volume::new(data, 1.0);
        let axial = volume.get_slice_from_axis(1, &Orientation::Axial).unwrap();
        assert_eq!(axial.dim(), (3, 4));
        let coronal = volume.get_slice_from_axis(2, &Orientation::Coronal).unwrap();
        assert_eq!(coronal[[1, 3]], 123.0);
        let sagittal = volume.get_slice_from_axis(3, &Orientation::Sagittal).unwrap();
        assert_eq!(sagittal.dim(), (2, 3));
        assert!(
            volume
                .get_slice_from_axis(4, &Orientation::Sagittal)
                .is_none()
        );
    }

    #[test]
    fn center_image_is_stretched() {
        let data = Array3::from_shape_fn((4, 4, 4), |(_, i, j)| (i * 4 + j) as f64);
        let image = Volume::new(data, 1.0).get_center_image(Orientation::Axial).unwrap();
        assert_eq!(image.dimensions(), (4, 4));
        assert_eq!(image.get_pixel(0, 0).0[0], 0);
        assert_eq!(image.get_pixel(3, 3).0[0], 255);
    }
}
