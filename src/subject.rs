//! Subject identifiers and scan modalities

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// BIDS participant label, always stored with the `sub-` prefix
///
/// Raw dataset ids such as `s0645` are accepted and canonicalised to
/// `sub-0645`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let label = if let Some(label) = raw.strip_prefix("sub-") {
            label
        } else if let Some(digits) = raw.strip_prefix('s') {
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::MalformedInput(format!("invalid subject id '{}'", raw)));
            }
            digits
        } else {
            return Err(Error::MalformedInput(format!("invalid subject id '{}'", raw)));
        };

        if label.is_empty() || !label.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::MalformedInput(format!("invalid subject id '{}'", raw)));
        }
        Ok(SubjectId(format!("sub-{}", label)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Label without the `sub-` prefix
    pub fn label(&self) -> &str {
        &self.0[4..]
    }

    /// Numeric value of the label, if it is all digits
    pub fn number(&self) -> Option<u64> {
        self.label().parse().ok()
    }

    /// Folder name used by the raw dataset (`s` + label zero-padded to 4)
    pub fn raw_folder(&self) -> String {
        format!("s{:0>4}", self.label())
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SubjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SubjectId::parse(s)
    }
}

impl TryFrom<String> for SubjectId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        SubjectId::parse(&value)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> String {
        id.0
    }
}

/// Anatomical contrast of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    T1w,
    T2w,
}

impl Modality {
    pub const ALL: [Modality; 2] = [Modality::T1w, Modality::T2w];

    /// BIDS filename suffix
    pub fn suffix(&self) -> &'static str {
        match self {
            Modality::T1w => "T1w",
            Modality::T2w => "T2w",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// One value per modality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityPair<T> {
    pub t1w: T,
    pub t2w: T,
}

impl<T> ModalityPair<T> {
    pub fn get(&self, modality: Modality) -> &T {
        match modality {
            Modality::T1w => &self.t1w,
            Modality::T2w => &self.t2w,
        }
    }

    /// Build a pair by evaluating `f` for T1w then T2w, stopping at the first error
    pub fn try_from_fn<E>(mut f: impl FnMut(Modality) -> std::result::Result<T, E>) -> std::result::Result<Self, E> {
        let t1w = f(Modality::T1w)?;
        let t2w = f(Modality::T2w)?;
        Ok(ModalityPair { t1w, t2w })
    }
}
