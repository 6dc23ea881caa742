//! Nearest-neighbour resampling between voxel grids
//!
//! Target voxels are mapped through `inv(source_affine) * target_affine`
//! into source voxel space and rounded to the nearest source voxel. Target
//! voxels falling outside the source grid are set to 0.

use crate::affine;
use crate::error::{Error, Result};
use crate::volume::Volume;

/// Largest grid extent a NIfTI-1 header can describe
pub const MAX_GRID_DIM: usize = i16::MAX as usize;

/// Target grid derived from a voxel size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetGrid {
    pub affine: [f64; 16],
    pub dims: (usize, usize, usize),
}

/// Resample `source` onto the grid `(target_affine, target_dims)`
///
/// Every frame of a 4D volume is resampled the same way. The header is
/// carried over; affine, dims and voxel size are replaced together.
pub fn resample_nearest(
    source: &Volume,
    target_affine: &[f64; 16],
    target_dims: (usize, usize, usize),
) -> Result<Volume> {
    if source.same_grid_as(target_affine, target_dims) {
        return source.regridded(source.data.clone(), target_dims, *target_affine);
    }

    let inv = affine::invert(&source.affine)
        .ok_or_else(|| Error::MalformedInput("source affine is not invertible".to_string()))?;
    let vox_to_vox = affine::multiply(&inv, target_affine);

    let (nx, ny, nz) = source.dims;
    let (tx, ty, tz) = target_dims;
    let n_target = tx * ty * tz;

    // Source linear index for each target voxel, None if outside the grid
    let mut lookup: Vec<Option<usize>> = Vec::with_capacity(n_target);
    for k in 0..tz {
        for j in 0..ty {
            for i in 0..tx {
                let p = affine::apply(&vox_to_vox, [i as f64, j as f64, k as f64]);
                lookup.push(nearest_index(p, nx, ny, nz));
            }
        }
    }

    let n_source = source.n_spatial();
    let mut data = vec![0.0; n_target * source.nt];
    for t in 0..source.nt {
        let src = &source.data[t * n_source..(t + 1) * n_source];
        let dst = &mut data[t * n_target..(t + 1) * n_target];
        for (out, idx) in dst.iter_mut().zip(lookup.iter()) {
            if let Some(idx) = idx {
                *out = src[*idx];
            }
        }
    }

    source.regridded(data, target_dims, *target_affine)
}

#[inline]
fn nearest_index(p: [f64; 3], nx: usize, ny: usize, nz: usize) -> Option<usize> {
    let i = p[0].round();
    let j = p[1].round();
    let k = p[2].round();
    if i < 0.0 || j < 0.0 || k < 0.0 || !(i.is_finite() && j.is_finite() && k.is_finite()) {
        return None;
    }
    let (i, j, k) = (i as usize, j as usize, k as usize);
    if i >= nx || j >= ny || k >= nz {
        return None;
    }
    Some(i + j * nx + k * nx * ny)
}

/// Grid with diagonal spacing `voxel_size` covering the source field of view
///
/// The bounding box of the source grid corners, expressed in the target
/// voxel frame, gives the offset (its lower corner) and the shape
/// (`ceil(max - min) + 1` per axis).
pub fn target_grid_for_voxel_size(
    source_dims: (usize, usize, usize),
    source_affine: &[f64; 16],
    voxel_size: (f64, f64, f64),
) -> Result<TargetGrid> {
    let (vx, vy, vz) = voxel_size;
    if !(vx > 0.0 && vy > 0.0 && vz > 0.0) || !(vx.is_finite() && vy.is_finite() && vz.is_finite()) {
        return Err(Error::MalformedInput(format!(
            "target voxel size must be positive, got {:?}",
            voxel_size
        )));
    }

    let scale = affine::from_voxel_size(voxel_size);
    // Diagonal, so the inverse is exact and always exists
    let inv_scale = affine::from_voxel_size((1.0 / vx, 1.0 / vy, 1.0 / vz));
    let transform = affine::multiply(&inv_scale, source_affine);
    let bounds = affine::grid_bounds(source_dims, &transform);

    let mut target_affine = scale;
    let mut extent = [0usize; 3];
    for axis in 0..3 {
        let (lo, hi) = bounds[axis];
        let n = (hi - lo).ceil() + 1.0;
        // NIfTI-1 stores dims as i16; checked before anything is allocated
        if !(n <= MAX_GRID_DIM as f64) {
            return Err(Error::MalformedInput(format!(
                "voxel size {:?} gives {} voxels along axis {}, more than {}",
                voxel_size, n, axis, MAX_GRID_DIM
            )));
        }
        extent[axis] = n as usize;
        target_affine[axis * 4 + 3] = scale[axis * 4 + axis] * lo;
    }

    Ok(TargetGrid {
        affine: target_affine,
        dims: (extent[0], extent[1], extent[2]),
    })
}

/// Resample onto a diagonal grid with the given voxel size
pub fn resample_to_voxel_size(source: &Volume, voxel_size: (f64, f64, f64)) -> Result<Volume> {
    let grid = target_grid_for_voxel_size(source.dims, &source.affine, voxel_size)?;
    resample_nearest(source, &grid.affine, grid.dims)
}

/// Resample a mask onto the grid of `image`, preserving its values
pub fn resample_mask_to(mask: &Volume, image: &Volume) -> Result<Volume> {
    resample_nearest(mask, &image.affine, image.dims)
}

impl Volume {
    fn same_grid_as(&self, affine: &[f64; 16], dims: (usize, usize, usize)) -> bool {
        self.dims == dims && affine::approx_eq(&self.affine, affine, crate::volume::GRID_TOLERANCE)
    }
}
