//! Dataset path conventions
//!
//! Pure mapping from (root, subject, modality) to file locations; nothing
//! here touches the filesystem.

use std::path::{Path, PathBuf};

use crate::subject::{Modality, SubjectId};

/// Folder name of the simulated derivative under `derivatives/`
pub const DERIVATIVE_FOLDER: &str = "simulated_low-field";
const VOLUME_EXT: &str = "nii.gz";

/// BIDS dataset rooted at `root`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DatasetLayout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn participants_table(&self) -> PathBuf {
        self.root.join("participants.tsv")
    }

    pub fn anat_dir(&self, subject: &SubjectId) -> PathBuf {
        self.root.join(subject.as_str()).join("anat")
    }

    /// `{sub}/anat/{sub}_{mod}.nii.gz`
    pub fn anat_image(&self, subject: &SubjectId, modality: Modality) -> PathBuf {
        self.anat_dir(subject)
            .join(format!("{}_{}.{}", subject, modality.suffix(), VOLUME_EXT))
    }

    /// `derivatives/simulated_low-field`
    pub fn derivative_root(&self) -> PathBuf {
        self.root.join("derivatives").join(DERIVATIVE_FOLDER)
    }

    /// `derivatives/simulated_low-field/{sub}/anat`
    pub fn derivative_dir(&self, subject: &SubjectId) -> PathBuf {
        self.derivative_root().join(subject.as_str()).join("anat")
    }

    fn derivative_stem(subject: &SubjectId, modality: Modality) -> String {
        format!("{}_{}_{}", subject, modality.suffix(), DERIVATIVE_FOLDER)
    }

    pub fn derivative_image(&self, subject: &SubjectId, modality: Modality) -> PathBuf {
        self.derivative_dir(subject)
            .join(format!("{}.{}", Self::derivative_stem(subject, modality), VOLUME_EXT))
    }

    /// Provenance sidecar, same basename as the derivative image
    pub fn derivative_sidecar(&self, subject: &SubjectId, modality: Modality) -> PathBuf {
        self.derivative_dir(subject)
            .join(format!("{}.json", Self::derivative_stem(subject, modality)))
    }

    /// Image read by the estimator: native scan or simulated derivative
    pub fn image(&self, subject: &SubjectId, modality: Modality, derivative: bool) -> PathBuf {
        if derivative {
            self.derivative_image(subject, modality)
        } else {
            self.anat_image(subject, modality)
        }
    }
}

/// Where the per-subject ROI masks live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskLayout {
    /// Raw dataset: `{root}/sNNNN/t2_mask.nii.gz`
    Raw(PathBuf),
    /// BIDS derivative: `{root}/derivatives/masks/{sub}/{sub}_T1w_T2w_mask.nii.gz`
    Bids(PathBuf),
}

impl MaskLayout {
    pub fn mask(&self, subject: &SubjectId) -> PathBuf {
        match self {
            MaskLayout::Raw(root) => root.join(subject.raw_folder()).join("t2_mask.nii.gz"),
            MaskLayout::Bids(root) => root
                .join("derivatives")
                .join("masks")
                .join(subject.as_str())
                .join(format!("{}_T1w_T2w_mask.{}", subject, VOLUME_EXT)),
        }
    }
}
