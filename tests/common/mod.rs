//! Common test utilities for lowfield-sim integration tests
//!
//! Builds small synthetic BIDS datasets in a temporary directory: a
//! participants table, T1w/T2w scans whose ROI has a known mean and
//! standard deviation, and raw-layout ROI masks.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use lowfield_sim::affine;
use lowfield_sim::layout::{DatasetLayout, MaskLayout};
use lowfield_sim::nifti_io::save_nifti_to_file;
use lowfield_sim::{Modality, SubjectId, Volume};
use tempfile::TempDir;

/// Grid of every synthetic scan, 1 mm isotropic
pub const DIMS: (usize, usize, usize) = (8, 8, 10);

/// ROI bounds (half-open) per axis; 4 x 4 x 6 = 96 voxels
pub const ROI: [(usize, usize); 3] = [(2, 6), (2, 6), (2, 8)];

/// Mean intensity inside the ROI
pub const ROI_MEAN: f64 = 100.0;

/// Background intensity outside the ROI
pub const BACKGROUND: f64 = 40.0;

fn in_roi(x: usize, y: usize, z: usize) -> bool {
    let [(x0, x1), (y0, y1), (z0, z1)] = ROI;
    (x0..x1).contains(&x) && (y0..y1).contains(&y) && (z0..z1).contains(&z)
}

fn build(f: impl Fn(usize, usize, usize) -> f64) -> Volume {
    let (nx, ny, nz) = DIMS;
    let mut data = vec![0.0; nx * ny * nz];
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                data[x + y * nx + z * nx * ny] = f(x, y, z);
            }
        }
    }
    Volume::new(data, DIMS, affine::from_voxel_size((1.0, 1.0, 1.0))).unwrap()
}

/// Binary mask of the ROI block
pub fn roi_mask() -> Volume {
    build(|x, y, z| if in_roi(x, y, z) { 1.0 } else { 0.0 })
}

/// Scan whose ROI alternates between `ROI_MEAN ± spread`
///
/// The ROI holds an even number of voxels of each parity, so its
/// population standard deviation is exactly `spread`.
pub fn scan_with_roi_std(spread: f64) -> Volume {
    build(|x, y, z| {
        if !in_roi(x, y, z) {
            BACKGROUND
        } else if (x + y + z) % 2 == 0 {
            ROI_MEAN + spread
        } else {
            ROI_MEAN - spread
        }
    })
}

/// A participants row: id, age in months, diagnosis
pub struct Row<'a>(pub &'a str, pub &'a str, pub &'a str);

/// Synthetic dataset on disk; removed when dropped
pub struct SyntheticDataset {
    dir: TempDir,
}

impl SyntheticDataset {
    pub fn new(rows: &[Row]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut table = String::from("participant_id\tsex\tage\tdiagnosis\n");
        for Row(id, age, diagnosis) in rows {
            table.push_str(&format!("{}\tF\t{}\t{}\n", id, age, diagnosis));
        }
        fs::write(dir.path().join("participants.tsv"), table).unwrap();
        SyntheticDataset { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn layout(&self) -> DatasetLayout {
        DatasetLayout::new(self.root())
    }

    pub fn mask_root(&self) -> PathBuf {
        self.root().join("masks")
    }

    pub fn masks(&self) -> MaskLayout {
        MaskLayout::Raw(self.mask_root())
    }

    pub fn write_scan(&self, subject: &str, modality: Modality, volume: &Volume) -> PathBuf {
        let subject = SubjectId::parse(subject).unwrap();
        let path = self.layout().anat_image(&subject, modality);
        write_volume(&path, volume);
        path
    }

    pub fn write_mask(&self, subject: &str, volume: &Volume) -> PathBuf {
        let subject = SubjectId::parse(subject).unwrap();
        let path = self.masks().mask(&subject);
        write_volume(&path, volume);
        path
    }

    /// Both scans and the ROI mask, with the given ROI standard deviations
    pub fn add_subject(&self, subject: &str, t1w_std: f64, t2w_std: f64) {
        self.write_scan(subject, Modality::T1w, &scan_with_roi_std(t1w_std));
        self.write_scan(subject, Modality::T2w, &scan_with_roi_std(t2w_std));
        self.write_mask(subject, &roi_mask());
    }
}

fn write_volume(path: &Path, volume: &Volume) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    save_nifti_to_file(path, volume).unwrap();
}

/// Parse a JSON file into a generic value
pub fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}
