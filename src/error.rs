//! Error types for the low-field simulation pipeline

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::subject::{Modality, SubjectId};

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage a per-subject failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Estimate,
    Calibrate,
    Simulate,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Estimate => "estimate",
            Stage::Calibrate => "calibrate",
            Stage::Simulate => "simulate",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or ill-formed metadata (columns, ids, grids)
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// No non-zero voxel left after masking
    #[error("degenerate ROI: no non-zero voxels under the mask ({mask_voxels} mask voxels)")]
    DegenerateRoi { mask_voxels: usize },

    /// Calibrated noise level is negative or not finite
    #[error(
        "invalid calibration for {modality}: measured std {measured_std:.2} exceeds reference {reference_std:.2}"
    )]
    InvalidCalibration {
        modality: Modality,
        measured_std: f64,
        reference_std: f64,
    },

    /// An expected per-subject image or mask is absent
    #[error("missing file: {}", .0.display())]
    MissingFile(PathBuf),

    /// NIfTI decode/encode failure
    #[error("NIfTI error: {0}")]
    Nifti(String),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure of one subject, tagged with where it happened
    #[error("{subject}{}: {stage} failed: {source}", modality_suffix(.modality))]
    Subject {
        subject: SubjectId,
        modality: Option<Modality>,
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

fn modality_suffix(modality: &Option<Modality>) -> String {
    match modality {
        Some(m) => format!(" [{}]", m),
        None => String::new(),
    }
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    /// Attach subject, modality and stage context.
    ///
    /// Already-tagged errors are returned unchanged.
    pub fn for_subject(self, subject: &SubjectId, modality: Option<Modality>, stage: Stage) -> Self {
        match self {
            tagged @ Error::Subject { .. } => tagged,
            other => Error::Subject {
                subject: subject.clone(),
                modality,
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping subject context
    pub fn root(&self) -> &Error {
        match self {
            Error::Subject { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_context_message() {
        let subject: SubjectId = "sub-0001".parse().unwrap();
        let err = Error::DegenerateRoi { mask_voxels: 9 }
            .for_subject(&subject, Some(Modality::T2w), Stage::Estimate);
        let msg = err.to_string();
        assert!(msg.contains("sub-0001"), "{}", msg);
        assert!(msg.contains("T2w"), "{}", msg);
        assert!(msg.contains("estimate"), "{}", msg);
        assert!(matches!(err.root(), Error::DegenerateRoi { .. }));
    }

    #[test]
    fn test_for_subject_does_not_double_wrap() {
        let subject: SubjectId = "sub-0002".parse().unwrap();
        let err = Error::MissingFile(PathBuf::from("x.nii.gz"))
            .for_subject(&subject, None, Stage::Load)
            .for_subject(&subject, Some(Modality::T1w), Stage::Write);
        match err {
            Error::Subject { stage, modality, .. } => {
                assert_eq!(stage, Stage::Load);
                assert_eq!(modality, None);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
