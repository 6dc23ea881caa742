//! Provenance sidecars for simulated derivatives
//!
//! Each derivative volume gets a JSON file with the same basename listing
//! the processing steps that produced it, in order.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use crate::error::{Error, Result};

pub const DERIVATIVE_NAME: &str = "Simulated low-field MRI images";
pub const BIDS_VERSION: &str = "1.9.0";
pub const LICENSE: &str = "CC-by 4.0";

/// One processing step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Step")]
pub enum ProcessingStep {
    #[serde(rename = "Downsampling", rename_all = "PascalCase")]
    Downsampling {
        resolution: String,
        tool: String,
        interpolation: String,
    },
    #[serde(rename = "Noise Addition", rename_all = "PascalCase")]
    NoiseAddition {
        noise_type: String,
        noise_parameters: NoiseParameters,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NoiseParameters {
    /// Always 0
    pub mean: u32,
    /// Rounded to 2 decimals
    pub standard_deviation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Metadata sidecar of one derivative image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvenanceRecord {
    pub name: String,
    pub processing: Vec<ProcessingStep>,
}

/// `dataset_description.json` of the derivative folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatasetDescription {
    pub name: String,
    #[serde(rename = "BIDSVersion")]
    pub bids_version: String,
    pub license: String,
    pub description: String,
}

/// Round to 2 decimal places
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// "1.6 mm x 1.6 mm x 5 mm"
fn format_resolution(voxel_size: (f64, f64, f64)) -> String {
    format!("{} mm x {} mm x {} mm", voxel_size.0, voxel_size.1, voxel_size.2)
}

impl ProvenanceRecord {
    /// Downsampling followed by Gaussian noise addition
    pub fn low_field(voxel_size: (f64, f64, f64), target_std: f64, seed: Option<u64>) -> Self {
        ProvenanceRecord {
            name: DERIVATIVE_NAME.to_string(),
            processing: vec![
                ProcessingStep::Downsampling {
                    resolution: format_resolution(voxel_size),
                    tool: format!("{} version {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
                    interpolation: "Nearest neighbour".to_string(),
                },
                ProcessingStep::NoiseAddition {
                    noise_type: "Gaussian".to_string(),
                    noise_parameters: NoiseParameters {
                        mean: 0,
                        standard_deviation: round2(target_std),
                        seed,
                    },
                },
            ],
        }
    }
}

impl Default for DatasetDescription {
    fn default() -> Self {
        DatasetDescription {
            name: DERIVATIVE_NAME.to_string(),
            bids_version: BIDS_VERSION.to_string(),
            license: LICENSE.to_string(),
            description: "Only the participants with a normal diagnosis and age 0 are included in this folder. \
                          A downsampling and Gaussian noise addition have been applied to the T1w and T2w images."
                .to_string(),
        }
    }
}

/// Serialise with 4-space indentation
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| Error::MalformedInput(format!("non UTF-8 JSON output: {}", e)))
}

/// Write a provenance record to `path`
pub fn write_provenance(path: &Path, record: &ProvenanceRecord) -> Result<()> {
    let json = to_json(record)?;
    std::fs::write(path, json).map_err(|e| Error::io(path, e))
}

/// Write `dataset_description.json` into `dir`
pub fn write_dataset_description(dir: &Path, description: &DatasetDescription) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let path = dir.join("dataset_description.json");
    std::fs::write(&path, to_json(description)?).map_err(|e| Error::io(&path, e))
}
