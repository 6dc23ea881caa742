//! ROI signal-to-noise estimation
//!
//! The image is multiplied by the ROI mask and the non-zero products are
//! reduced to mean, population standard deviation and `mean / std`.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::resample::resample_mask_to;
use crate::volume::Volume;

/// Statistics over the masked, non-zero voxels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnrMeasurement {
    pub mean: f64,
    /// Population standard deviation (ddof = 0)
    pub std: f64,
    pub snr: f64,
    /// Number of voxels that entered the reduction
    pub voxels: usize,
}

/// How to treat a mask whose grid differs from the image's
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridPolicy {
    /// Grids must already match
    Exact,
    /// Resample the mask (nearest neighbour) onto the image grid when they differ
    ResampleMask,
}

impl GridPolicy {
    /// Simulated derivatives live on a coarser grid than the native mask
    pub fn for_derivative(derivative: bool) -> Self {
        if derivative {
            GridPolicy::ResampleMask
        } else {
            GridPolicy::Exact
        }
    }
}

/// Estimate ROI statistics of `image` under `mask`
pub fn estimate(image: &Volume, mask: &Volume, policy: GridPolicy) -> Result<SnrMeasurement> {
    if mask.nt != 1 {
        return Err(Error::MalformedInput(format!("mask must be 3D, got {} frames", mask.nt)));
    }

    if image.same_grid(mask) {
        return masked_statistics(&image.data, &mask.data);
    }

    match policy {
        GridPolicy::Exact if image.dims != mask.dims => Err(Error::MalformedInput(format!(
            "mask grid {:?} does not match image grid {:?}",
            mask.dims, image.dims
        ))),
        // Same shape, affines differ only by header precision
        GridPolicy::Exact => masked_statistics(&image.data, &mask.data),
        GridPolicy::ResampleMask => {
            let resampled = resample_mask_to(mask, image)?;
            masked_statistics(&image.data, &resampled.data)
        }
    }
}

/// Reduce `image * mask` over its non-zero values
///
/// `image` may hold several frames; the mask is applied to each of them.
pub fn masked_statistics(image: &[f64], mask: &[f64]) -> Result<SnrMeasurement> {
    if mask.is_empty() || image.len() % mask.len() != 0 {
        return Err(Error::MalformedInput(format!(
            "image of {} voxels cannot be masked by {} voxels",
            image.len(),
            mask.len()
        )));
    }

    let values: Vec<f64> = image
        .chunks(mask.len())
        .flat_map(|frame| frame.iter().zip(mask.iter()).map(|(&v, &m)| v * m))
        .filter(|&v| v != 0.0)
        .collect();

    let count = values.len();
    if count == 0 {
        let mask_voxels = mask.iter().filter(|&&m| m != 0.0).count();
        return Err(Error::DegenerateRoi { mask_voxels });
    }

    let mean = values.iter().sum::<f64>() / count as f64;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
    let std = var.sqrt();

    Ok(SnrMeasurement {
        mean,
        std,
        snr: mean / std,
        voxels: count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine;

    fn roi_volume(values: &[(usize, f64)], dims: (usize, usize, usize), affine: [f64; 16]) -> Volume {
        let mut data = vec![0.0; dims.0 * dims.1 * dims.2];
        for &(i, v) in values {
            data[i] = v;
        }
        Volume::new(data, dims, affine).unwrap()
    }

    #[test]
    fn test_basic_statistics() {
        let image = roi_volume(&[(0, 90.0), (1, 110.0), (5, 1000.0)], (2, 2, 2), affine::IDENTITY);
        let mask = roi_volume(&[(0, 1.0), (1, 1.0)], (2, 2, 2), affine::IDENTITY);
        let m = estimate(&image, &mask, GridPolicy::Exact).unwrap();
        assert_eq!(m.voxels, 2);
        assert!((m.mean - 100.0).abs() < 1e-12);
        assert!((m.std - 10.0).abs() < 1e-12);
        assert!((m.snr - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_voxels_inside_mask_are_ignored() {
        let image = roi_volume(&[(0, 4.0), (1, 0.0), (2, 8.0)], (2, 2, 2), affine::IDENTITY);
        let mask = roi_volume(&[(0, 1.0), (1, 1.0), (2, 1.0)], (2, 2, 2), affine::IDENTITY);
        let m = estimate(&image, &mask, GridPolicy::Exact).unwrap();
        assert_eq!(m.voxels, 2);
        assert!((m.mean - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_roi() {
        let image = roi_volume(&[(7, 50.0)], (2, 2, 2), affine::IDENTITY);
        let mask = roi_volume(&[(0, 1.0), (1, 1.0)], (2, 2, 2), affine::IDENTITY);
        match estimate(&image, &mask, GridPolicy::Exact) {
            Err(Error::DegenerateRoi { mask_voxels }) => assert_eq!(mask_voxels, 2),
            other => panic!("expected DegenerateRoi, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_policy_rejects_shape_mismatch() {
        let image = roi_volume(&[(0, 1.0)], (2, 2, 2), affine::IDENTITY);
        let mask = roi_volume(&[(0, 1.0)], (3, 2, 2), affine::IDENTITY);
        assert!(matches!(
            estimate(&image, &mask, GridPolicy::Exact),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_policies_agree_on_matching_grid() {
        let a = affine::from_voxel_size((0.9, 0.9, 1.2));
        let image = roi_volume(&[(0, 3.0), (3, 5.0), (6, 11.0)], (2, 2, 2), a);
        let mask = roi_volume(&[(0, 1.0), (3, 1.0), (6, 1.0)], (2, 2, 2), a);
        let exact = estimate(&image, &mask, GridPolicy::Exact).unwrap();
        let resampled = estimate(&image, &mask, GridPolicy::ResampleMask).unwrap();
        assert_eq!(exact, resampled);
    }

    #[test]
    fn test_mask_resampled_onto_coarse_grid() {
        // 1 mm mask with a 4x4x4 block at 4..8, image on a 2 mm grid
        let mut mask_data = vec![0.0; 12 * 12 * 12];
        for k in 4..8 {
            for j in 4..8 {
                for i in 4..8 {
                    mask_data[i + j * 12 + k * 144] = 1.0;
                }
            }
        }
        let mask = Volume::new(mask_data, (12, 12, 12), affine::IDENTITY).unwrap();
        let image = Volume::new(vec![7.0; 6 * 6 * 6], (6, 6, 6), affine::from_voxel_size((2.0, 2.0, 2.0))).unwrap();

        assert!(estimate(&image, &mask, GridPolicy::Exact).is_err());
        let m = estimate(&image, &mask, GridPolicy::ResampleMask).unwrap();
        // Coarse voxels 2..4 on each axis land inside the block
        assert_eq!(m.voxels, 8);
        assert!((m.mean - 7.0).abs() < 1e-12);
        assert_eq!(m.std, 0.0);
    }

    #[test]
    fn test_masked_statistics_multiframe() {
        let image = vec![1.0, 0.0, 3.0, 0.0];
        let mask = vec![1.0, 1.0];
        let m = masked_statistics(&image, &mask).unwrap();
        assert_eq!(m.voxels, 2);
        assert!((m.mean - 2.0).abs() < 1e-12);
        assert!((m.std - 1.0).abs() < 1e-12);
    }
}
