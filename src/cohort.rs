//! Participants table and cohort selection

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::subject::SubjectId;

/// One row of `participants.tsv`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: SubjectId,
    /// Age in months, `None` when recorded as `n/a`
    pub age: Option<u32>,
    pub diagnosis: String,
}

/// Inclusion and exclusion rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortCriteria {
    pub diagnosis: String,
    pub age_months: u32,
    /// Subjects with known scan artefacts
    pub exclusions: Vec<SubjectId>,
}

impl Default for CohortCriteria {
    fn default() -> Self {
        let exclusions = ["sub-0645", "sub-0672", "sub-0841"]
            .iter()
            .filter_map(|s| SubjectId::parse(s).ok())
            .collect();
        CohortCriteria {
            diagnosis: "normal".to_string(),
            age_months: 0,
            exclusions,
        }
    }
}

impl CohortCriteria {
    pub fn includes(&self, participant: &Participant) -> bool {
        participant.diagnosis == self.diagnosis
            && participant.age == Some(self.age_months)
            && !self.exclusions.contains(&participant.id)
    }
}

fn column(header: &[&str], name: &str) -> Result<usize> {
    header
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| Error::MalformedInput(format!("participants table has no '{}' column", name)))
}

/// Parse a tab-separated participants table with a header row
///
/// Columns are found by name. Blank lines are skipped.
pub fn parse_participants(text: &str) -> Result<Vec<Participant>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| Error::MalformedInput("participants table is empty".to_string()))?
        .split('\t')
        .collect();

    let id_col = column(&header, "participant_id")?;
    let age_col = column(&header, "age")?;
    let diagnosis_col = column(&header, "diagnosis")?;

    let mut participants = Vec::new();
    for (row, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != header.len() {
            return Err(Error::MalformedInput(format!(
                "participants row {} has {} fields, header has {}",
                row + 1,
                fields.len(),
                header.len()
            )));
        }

        let id = SubjectId::parse(fields[id_col])?;
        let age = match fields[age_col].trim() {
            "" | "n/a" => None,
            raw => Some(raw.parse::<u32>().map_err(|_| {
                Error::MalformedInput(format!("invalid age '{}' for {}", raw, id))
            })?),
        };
        participants.push(Participant {
            id,
            age,
            diagnosis: fields[diagnosis_col].trim().to_string(),
        });
    }

    Ok(participants)
}

/// Read and parse `participants.tsv`
pub fn read_participants(path: &Path) -> Result<Vec<Participant>> {
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_participants(&text)
}

/// Ids of the participants matching `criteria`, in table order
pub fn select_cohort(participants: &[Participant], criteria: &CohortCriteria) -> Vec<SubjectId> {
    participants
        .iter()
        .filter(|p| criteria.includes(p))
        .map(|p| p.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "participant_id\tage\tdiagnosis\n\
                         sub-0001\t0\tnormal\n\
                         sub-0002\t3\tnormal\n\
                         sub-0645\t0\tnormal\n\
                         sub-0003\t0\tleukodystrophy\n\
                         sub-0004\tn/a\tnormal\n\
                         sub-0005\t0\tnormal\n";

    #[test]
    fn test_select_default_cohort() {
        let participants = parse_participants(TABLE).unwrap();
        assert_eq!(participants.len(), 6);
        let cohort = select_cohort(&participants, &CohortCriteria::default());
        let ids: Vec<&str> = cohort.iter().map(|s| s.as_str()).collect();
        assert_eq!(ids, vec!["sub-0001", "sub-0005"]);
    }

    #[test]
    fn test_columns_found_by_name() {
        let table = "diagnosis\tparticipant_id\tsex\tage\nnormal\ts0007\tF\t0\n";
        let participants = parse_participants(table).unwrap();
        assert_eq!(participants[0].id.as_str(), "sub-0007");
        assert_eq!(participants[0].age, Some(0));
        assert_eq!(select_cohort(&participants, &CohortCriteria::default()).len(), 1);
    }

    #[test]
    fn test_missing_column() {
        let table = "participant_id\tage\nsub-0001\t0\n";
        match parse_participants(table) {
            Err(Error::MalformedInput(msg)) => assert!(msg.contains("diagnosis"), "{}", msg),
            other => panic!("expected MalformedInput, got {:?}", other),
        }
    }

    #[test]
    fn test_ragged_row() {
        let table = "participant_id\tage\tdiagnosis\nsub-0001\t0\n";
        assert!(matches!(parse_participants(table), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_bad_age() {
        let table = "participant_id\tage\tdiagnosis\nsub-0001\tnewborn\tnormal\n";
        assert!(matches!(parse_participants(table), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_empty_table() {
        assert!(matches!(parse_participants(""), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_custom_criteria() {
        let participants = parse_participants(TABLE).unwrap();
        let criteria = CohortCriteria {
            diagnosis: "normal".to_string(),
            age_months: 3,
            exclusions: Vec::new(),
        };
        let cohort = select_cohort(&participants, &criteria);
        assert_eq!(cohort.len(), 1);
        assert_eq!(cohort[0].as_str(), "sub-0002");
    }
}
