//! Cohort-level low-field simulation
//!
//! For each selected subject: load T1w, T2w and the ROI mask once,
//! measure ROI noise on the native scans, calibrate the additive noise for
//! both modalities, then resample, add noise and write the derivative
//! volume with its provenance sidecar. Subjects are independent; with
//! [`FailurePolicy::Skip`] a failing subject is logged and the run goes on.

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, info_span, warn};

use crate::calibration::NoiseCalibration;
use crate::cohort::{read_participants, select_cohort};
use crate::config::{FailurePolicy, SimulationConfig};
use crate::error::{Error, Result, Stage};
use crate::layout::{DatasetLayout, MaskLayout};
use crate::nifti_io::{read_nifti_file, save_nifti_to_file};
use crate::provenance::{write_dataset_description, write_provenance, DatasetDescription, ProvenanceRecord};
use crate::simulate::{simulate, subject_seed};
use crate::snr::{estimate, GridPolicy, SnrMeasurement};
use crate::subject::{Modality, ModalityPair, SubjectId};
use crate::volume::Volume;

/// Everything read from disk for one subject
#[derive(Debug, Clone)]
pub struct SubjectScans {
    pub subject: SubjectId,
    pub images: ModalityPair<Volume>,
    pub mask: Volume,
    /// Whether `images` are simulated derivatives
    pub derivative: bool,
}

impl SubjectScans {
    pub fn load(layout: &DatasetLayout, masks: &MaskLayout, subject: &SubjectId, derivative: bool) -> Result<Self> {
        let images = ModalityPair::try_from_fn(|modality| {
            read_nifti_file(&layout.image(subject, modality, derivative))
                .map_err(|e| e.for_subject(subject, Some(modality), Stage::Load))
        })?;
        let mask = read_nifti_file(&masks.mask(subject)).map_err(|e| e.for_subject(subject, None, Stage::Load))?;

        Ok(SubjectScans {
            subject: subject.clone(),
            images,
            mask,
            derivative,
        })
    }

    pub fn image(&self, modality: Modality) -> &Volume {
        self.images.get(modality)
    }

    /// ROI statistics for both modalities
    ///
    /// Derivatives live on a coarser grid, so the mask is resampled onto
    /// them; native scans must share the mask's grid.
    pub fn estimate(&self) -> Result<ModalityPair<SnrMeasurement>> {
        let policy = GridPolicy::for_derivative(self.derivative);
        ModalityPair::try_from_fn(|modality| -> Result<SnrMeasurement> {
            let m = estimate(self.image(modality), &self.mask, policy)
                .map_err(|e| e.for_subject(&self.subject, Some(modality), Stage::Estimate))?;
            debug!(
                subject = %self.subject,
                %modality,
                mean = m.mean,
                std = m.std,
                snr = m.snr,
                voxels = m.voxels,
                "ROI measurement"
            );
            Ok(m)
        })
    }
}

/// One written derivative
#[derive(Debug, Clone)]
pub struct SimulatedScan {
    pub calibration: NoiseCalibration,
    pub dims: (usize, usize, usize),
    pub image_path: PathBuf,
    pub sidecar_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SubjectOutcome {
    pub subject: SubjectId,
    pub seed: u64,
    pub scans: ModalityPair<SimulatedScan>,
}

#[derive(Debug, Clone)]
pub struct SubjectSnr {
    pub subject: SubjectId,
    pub derivative: bool,
    pub measurements: ModalityPair<SnrMeasurement>,
}

/// Per-subject results of a cohort run
#[derive(Debug)]
pub struct CohortReport<T> {
    pub completed: Vec<T>,
    /// Failures of skipped subjects, each tagged with subject and stage
    pub failed: Vec<Error>,
}

impl<T> CohortReport<T> {
    fn new() -> Self {
        CohortReport {
            completed: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Pipeline {
    layout: DatasetLayout,
    masks: MaskLayout,
    config: SimulationConfig,
}

impl Pipeline {
    pub fn new(layout: DatasetLayout, masks: MaskLayout, config: SimulationConfig) -> Self {
        Pipeline { layout, masks, config }
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Subjects selected from the participants table
    pub fn cohort(&self) -> Result<Vec<SubjectId>> {
        let participants = read_participants(&self.layout.participants_table())?;
        let cohort = select_cohort(&participants, &self.config.cohort);
        info!(
            participants = participants.len(),
            selected = cohort.len(),
            "cohort selected"
        );
        Ok(cohort)
    }

    /// Measure ROI statistics of one subject's native or simulated scans
    pub fn measure_subject(&self, subject: &SubjectId, derivative: bool) -> Result<SubjectSnr> {
        let scans = SubjectScans::load(&self.layout, &self.masks, subject, derivative)?;
        Ok(SubjectSnr {
            subject: subject.clone(),
            derivative,
            measurements: scans.estimate()?,
        })
    }

    /// Simulate and write both low-field derivatives of one subject
    ///
    /// Both modalities are calibrated and simulated before anything is
    /// written, so a subject failing before the write stage leaves no
    /// output behind.
    pub fn simulate_subject(&self, subject: &SubjectId) -> Result<SubjectOutcome> {
        let _span = info_span!("subject", subject = %subject).entered();

        let scans = SubjectScans::load(&self.layout, &self.masks, subject, false)?;
        let measurements = scans.estimate()?;

        let reference = &self.config.reference_noise;
        let calibrations = ModalityPair::try_from_fn(|modality| -> Result<NoiseCalibration> {
            reference
                .calibrate(modality, measurements.get(modality).std)
                .map_err(|e| e.for_subject(subject, Some(modality), Stage::Calibrate))
        })?;

        let seed = subject_seed(self.config.seed, subject);
        let mut rng = StdRng::seed_from_u64(seed);
        let voxel_size = self.config.voxel_size();

        // T1w draws its noise first, then T2w
        let simulated = ModalityPair::try_from_fn(|modality| -> Result<Volume> {
            simulate(scans.image(modality), voxel_size, calibrations.get(modality).target_std, &mut rng)
                .map_err(|e| e.for_subject(subject, Some(modality), Stage::Simulate))
        })?;

        let out_dir = self.layout.derivative_dir(subject);
        std::fs::create_dir_all(&out_dir)
            .map_err(|e| Error::io(&out_dir, e).for_subject(subject, None, Stage::Write))?;

        let written = ModalityPair::try_from_fn(|modality| -> Result<SimulatedScan> {
            let calibration = *calibrations.get(modality);
            let volume = simulated.get(modality);
            let image_path = self.layout.derivative_image(subject, modality);
            let sidecar_path = self.layout.derivative_sidecar(subject, modality);
            let record = ProvenanceRecord::low_field(voxel_size, calibration.target_std, Some(seed));
            save_nifti_to_file(&image_path, volume)
                .and_then(|_| write_provenance(&sidecar_path, &record))
                .map_err(|e| e.for_subject(subject, Some(modality), Stage::Write))?;

            info!(
                %modality,
                measured_std = calibration.measured_std,
                target_std = calibration.target_std,
                dims = ?volume.dims,
                "wrote {}",
                image_path.display()
            );
            Ok(SimulatedScan {
                calibration,
                dims: volume.dims,
                image_path,
                sidecar_path,
            })
        })?;

        Ok(SubjectOutcome {
            subject: subject.clone(),
            seed,
            scans: written,
        })
    }

    /// Simulate the whole cohort
    pub fn run_simulation(&self) -> Result<CohortReport<SubjectOutcome>> {
        let cohort = self.cohort()?;
        write_dataset_description(&self.layout.derivative_root(), &DatasetDescription::default())?;
        let report = self.run_each(&cohort, |subject| self.simulate_subject(subject))?;
        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "simulation finished"
        );
        Ok(report)
    }

    /// Measure ROI statistics over the whole cohort
    pub fn measure_cohort(&self, derivative: bool) -> Result<CohortReport<SubjectSnr>> {
        let cohort = self.cohort()?;
        self.run_each(&cohort, |subject| self.measure_subject(subject, derivative))
    }

    fn run_each<T>(
        &self,
        cohort: &[SubjectId],
        mut f: impl FnMut(&SubjectId) -> Result<T>,
    ) -> Result<CohortReport<T>> {
        let mut report = CohortReport::new();
        for subject in cohort {
            match f(subject) {
                Ok(value) => report.completed.push(value),
                Err(e) => match self.config.failure_policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Skip => {
                        warn!(error = %e, "skipping subject");
                        report.failed.push(e);
                    }
                },
            }
        }
        Ok(report)
    }
}
