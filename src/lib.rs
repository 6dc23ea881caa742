//! lowfield-sim: simulated low-field MRI from high-field neonatal scans
//!
//! Takes a BIDS dataset of T1w/T2w scans, measures noise inside a
//! per-subject ROI mask, and writes degraded "low-field" derivatives:
//! nearest-neighbour downsampling to a coarse anisotropic grid plus
//! Gaussian noise calibrated so the final noise level matches a reference
//! low-field acquisition.
//!
//! # Modules
//! - `nifti_io`: NIfTI-1 read/write (gzip aware) with header preservation
//! - `affine`: 4x4 voxel-to-world transforms and qform quaternions
//! - `resample`: nearest-neighbour resampling to a voxel size
//! - `cohort`: participants table and inclusion rules
//! - `snr`: ROI mean/std/SNR estimation
//! - `calibration`: reference noise levels and target noise computation
//! - `simulate`: downsampling and noise addition
//! - `provenance`: JSON sidecars for derivatives
//! - `pipeline`: per-subject orchestration over a cohort

// Core modules
pub mod affine;
pub mod error;
pub mod subject;
pub mod volume;

// I/O modules
pub mod layout;
pub mod nifti_io;
pub mod provenance;

// Algorithm modules
pub mod calibration;
pub mod resample;
pub mod simulate;
pub mod snr;

// Orchestration
pub mod cohort;
pub mod config;
pub mod pipeline;

pub use error::{Error, Result, Stage};
pub use subject::{Modality, ModalityPair, SubjectId};
pub use volume::Volume;
