//! Low-field MRI simulation
//!
//! A high-field scan is resampled (nearest neighbour) onto a coarse,
//! non-isotropic grid and Gaussian noise with a calibrated standard
//! deviation is added to every voxel. Noise is drawn from the generator
//! passed in by the caller so output is reproducible for a given seed.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{Error, Result};
use crate::resample::resample_to_voxel_size;
use crate::subject::SubjectId;
use crate::volume::Volume;

/// Voxel size of the simulated low-field scanner in mm
pub const LOW_FIELD_VOXEL_SIZE: (f64, f64, f64) = (1.6, 1.6, 5.0);

/// Add zero-mean Gaussian noise to every value, in order
pub fn add_gaussian_noise<R: Rng + ?Sized>(data: &mut [f64], std_dev: f64, rng: &mut R) -> Result<()> {
    // Normal::new only rejects non-finite values
    if !std_dev.is_finite() || std_dev < 0.0 {
        return Err(Error::MalformedInput(format!("invalid noise standard deviation {}", std_dev)));
    }
    let normal = Normal::new(0.0, std_dev).map_err(|e| {
        Error::MalformedInput(format!("invalid noise standard deviation {}: {}", std_dev, e))
    })?;
    for v in data.iter_mut() {
        *v += normal.sample(rng);
    }
    Ok(())
}

/// Resample `image` to `voxel_size` and add N(0, `target_std`) noise
///
/// The input is not modified. Values are not clipped, so the result may
/// contain negative intensities. A negative `target_std` is rejected; use
/// [`crate::calibration`] to obtain a valid one.
pub fn simulate<R: Rng + ?Sized>(
    image: &Volume,
    voxel_size: (f64, f64, f64),
    target_std: f64,
    rng: &mut R,
) -> Result<Volume> {
    let mut resampled = resample_to_voxel_size(image, voxel_size)?;
    add_gaussian_noise(&mut resampled.data, target_std, rng)?;
    resampled.clear_display_range();
    Ok(resampled)
}

/// Seed for one subject, independent of its position in the cohort
pub fn subject_seed(base_seed: u64, subject: &SubjectId) -> u64 {
    match subject.number() {
        Some(n) => base_seed.wrapping_add(n),
        None => {
            // FNV-1a over the label
            let hash = subject
                .label()
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3));
            base_seed ^ hash
        }
    }
}
