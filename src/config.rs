//! Run configuration
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! reproduces the standard low-field simulation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::ReferenceNoise;
use crate::cohort::CohortCriteria;
use crate::error::{Error, Result};
use crate::simulate::LOW_FIELD_VOXEL_SIZE;

/// What to do when one subject fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure, record it and continue with the next subject
    #[default]
    Skip,
    /// Stop the run at the first failure
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Target voxel size in mm
    pub voxel_size: [f64; 3],
    pub reference_noise: ReferenceNoise,
    /// Base seed; each subject's generator is seeded from it and the subject id
    pub seed: u64,
    pub cohort: CohortCriteria,
    pub failure_policy: FailurePolicy,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let (x, y, z) = LOW_FIELD_VOXEL_SIZE;
        SimulationConfig {
            voxel_size: [x, y, z],
            reference_noise: ReferenceNoise::default(),
            seed: 42,
            cohort: CohortCriteria::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: SimulationConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingFile(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&text)
    }

    pub fn voxel_size(&self) -> (f64, f64, f64) {
        (self.voxel_size[0], self.voxel_size[1], self.voxel_size[2])
    }

    pub fn validate(&self) -> Result<()> {
        if self.voxel_size.iter().any(|&v| !(v > 0.0 && v.is_finite())) {
            return Err(Error::MalformedInput(format!(
                "voxel_size must be positive, got {:?}",
                self.voxel_size
            )));
        }
        let r = &self.reference_noise;
        if !(r.t1w.is_finite() && r.t2w.is_finite()) || r.t1w < 0.0 || r.t2w < 0.0 {
            return Err(Error::MalformedInput(format!("reference noise must be non-negative, got {:?}", r)));
        }
        Ok(())
    }
}
