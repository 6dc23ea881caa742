//! Noise calibration
//!
//! The additive noise level for a subject is the gap between an empirical
//! low-field noise floor and the noise already present in the scan:
//! `target_std = reference_std[modality] - measured_std`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::subject::Modality;

/// Low-field noise floor for T1w scans
pub const T1W_REFERENCE_STD: f64 = 79.50;
/// Low-field noise floor for T2w scans
pub const T2W_REFERENCE_STD: f64 = 86.54;

/// Reference noise standard deviation per modality
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceNoise {
    pub t1w: f64,
    pub t2w: f64,
}

impl Default for ReferenceNoise {
    fn default() -> Self {
        ReferenceNoise {
            t1w: T1W_REFERENCE_STD,
            t2w: T2W_REFERENCE_STD,
        }
    }
}

impl ReferenceNoise {
    pub fn get(&self, modality: Modality) -> f64 {
        match modality {
            Modality::T1w => self.t1w,
            Modality::T2w => self.t2w,
        }
    }

    /// Noise level to add to a scan of `modality` whose ROI std is `measured_std`
    ///
    /// A result of exactly zero is valid (no noise is added). A negative
    /// result means the scan is already noisier than the reference and is
    /// rejected with [`Error::InvalidCalibration`].
    pub fn calibrate(&self, modality: Modality, measured_std: f64) -> Result<NoiseCalibration> {
        let reference_std = self.get(modality);
        let target_std = reference_std - measured_std;
        if !target_std.is_finite() || target_std < 0.0 {
            return Err(Error::InvalidCalibration {
                modality,
                measured_std,
                reference_std,
            });
        }
        Ok(NoiseCalibration {
            modality,
            measured_std,
            reference_std,
            target_std,
        })
    }
}

/// Result of calibrating one scan
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoiseCalibration {
    pub modality: Modality,
    pub measured_std: f64,
    pub reference_std: f64,
    pub target_std: f64,
}

/// Calibrate against the default reference noise levels
pub fn calibrate(modality: Modality, measured_std: f64) -> Result<NoiseCalibration> {
    ReferenceNoise::default().calibrate(modality, measured_std)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_t1_reference_gives_zero() {
        let c = calibrate(Modality::T1w, 79.50).unwrap();
        assert_eq!(c.target_std, 0.0);
    }

    #[test]
    fn test_t2_scenario() {
        let c = calibrate(Modality::T2w, 10.0).unwrap();
        assert!((c.target_std - 76.54).abs() < 1e-9);
        assert_eq!(c.reference_std, 86.54);
    }

    #[test]
    fn test_strictly_decreasing() {
        let stds = [0.0, 1.0, 12.5, 40.0, 79.0];
        let targets: Vec<f64> = stds
            .iter()
            .map(|&s| calibrate(Modality::T1w, s).unwrap().target_std)
            .collect();
        for w in targets.windows(2) {
            assert!(w[1] < w[0], "{:?}", targets);
        }
    }

    #[test]
    fn test_exceeding_reference_is_rejected() {
        match calibrate(Modality::T1w, 90.0) {
            Err(Error::InvalidCalibration { modality, measured_std, reference_std }) => {
                assert_eq!(modality, Modality::T1w);
                assert_eq!(measured_std, 90.0);
                assert_eq!(reference_std, 79.50);
            }
            other => panic!("expected InvalidCalibration, got {:?}", other),
        }
    }

    #[test]
    fn test_nan_measurement_is_rejected() {
        assert!(calibrate(Modality::T2w, f64::NAN).is_err());
    }

    #[test]
    fn test_custom_reference() {
        let reference = ReferenceNoise { t1w: 50.0, t2w: 60.0 };
        let c = reference.calibrate(Modality::T2w, 15.0).unwrap();
        assert_eq!(c.target_std, 45.0);
    }
}
