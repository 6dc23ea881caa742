//! In-memory image volume
//!
//! Voxels are stored flat in Fortran order to match the NIfTI convention:
//! `index = x + y*nx + z*nx*ny + t*nx*ny*nz`.

use nifti::NiftiHeader;

use crate::affine;
use crate::error::{Error, Result};

/// Tolerance used when deciding whether two grids coincide
pub const GRID_TOLERANCE: f64 = 1e-6;

/// A 3D or 4D image with its grid and source header
#[derive(Debug, Clone)]
pub struct Volume {
    /// Voxel values as f64 (scaling already applied)
    pub data: Vec<f64>,
    /// Spatial dimensions (nx, ny, nz)
    pub dims: (usize, usize, usize),
    /// Number of volumes along the 4th axis (1 for 3D images)
    pub nt: usize,
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
    /// Header the volume was read from; fields the pipeline does not
    /// change are written back unchanged
    pub header: NiftiHeader,
}

impl Volume {
    /// Create a 3D volume with a default header
    pub fn new(data: Vec<f64>, dims: (usize, usize, usize), affine: [f64; 16]) -> Result<Self> {
        Self::with_frames(data, dims, 1, affine, NiftiHeader::default())
    }

    /// Create a volume with an explicit number of frames and header
    pub fn with_frames(
        data: Vec<f64>,
        dims: (usize, usize, usize),
        nt: usize,
        affine: [f64; 16],
        header: NiftiHeader,
    ) -> Result<Self> {
        let expected = dims.0 * dims.1 * dims.2 * nt;
        if data.len() != expected {
            return Err(Error::MalformedInput(format!(
                "volume data has {} voxels, expected {}x{}x{}x{} = {}",
                data.len(), dims.0, dims.1, dims.2, nt, expected
            )));
        }
        Ok(Volume {
            data,
            dims,
            nt,
            voxel_size: affine::voxel_sizes(&affine),
            affine,
            header,
        })
    }

    /// Number of voxels in one frame
    pub fn n_spatial(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }

    /// Voxel values of frame `t`
    pub fn frame(&self, t: usize) -> &[f64] {
        let n = self.n_spatial();
        &self.data[t * n..(t + 1) * n]
    }

    /// Whether `other` lives on the same voxel grid (shape and affine)
    pub fn same_grid(&self, other: &Volume) -> bool {
        self.dims == other.dims && affine::approx_eq(&self.affine, &other.affine, GRID_TOLERANCE)
    }

    /// Replace grid and data together, keeping the header
    ///
    /// Slice acquisition fields index slices of the old grid, so they are
    /// cleared when the shape changes.
    pub fn regridded(&self, data: Vec<f64>, dims: (usize, usize, usize), affine: [f64; 16]) -> Result<Volume> {
        let mut header = self.header.clone();
        if dims != self.dims {
            header.slice_start = 0;
            header.slice_end = 0;
            header.slice_code = 0;
        }
        Self::with_frames(data, dims, self.nt, affine, header)
    }

    /// Clear the display range, which no longer matches modified intensities
    pub fn clear_display_range(&mut self) {
        self.header.cal_min = 0.0;
        self.header.cal_max = 0.0;
    }
}
