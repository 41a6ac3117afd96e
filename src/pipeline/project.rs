use crate::constants::{MEM_ETHNICITY, MEM_RACE, NAME, RECONCILED_COLUMNS};
use crate::error::{IntakeError, Result};
use crate::pipeline::join::JoinedRow;
use crate::pipeline::parser::{FieldValue, Record, Table};
use crate::types::ReconciledPatient;
use std::collections::HashSet;

/// Project an enriched row onto the reconciled patient fields.
///
/// Fails with `MissingField` if imputation or name synthesis has not run.
pub fn project_row(row: &JoinedRow) -> Result<ReconciledPatient> {
    Ok(ReconciledPatient {
        person_key: row.person_key.clone(),
        name: row.name.clone().ok_or_else(|| IntakeError::MissingField(NAME.to_string()))?,
        age: row.age,
        gender: row.gender.clone(),
        race: row.race.clone().ok_or_else(|| IntakeError::MissingField(MEM_RACE.to_string()))?,
        ethnicity: row.ethnicity.ok_or_else(|| IntakeError::MissingField(MEM_ETHNICITY.to_string()))?,
    })
}

/// One patient per identity key, taken from the key's first row in join order
pub fn project(rows: &[JoinedRow]) -> Result<Vec<ReconciledPatient>> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|row| seen.insert(row.person_key.as_str()))
        .map(project_row)
        .collect()
}

/// Lay reconciled patients out as a table with the fixed output column order
pub fn to_table(patients: &[ReconciledPatient]) -> Table {
    let records = patients
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let values = [
                FieldValue::Text(p.person_key.clone()),
                FieldValue::Text(p.name.clone()),
                p.age.map_or(FieldValue::Absent, |a| FieldValue::Integer(i64::from(a))),
                p.gender.clone().map_or(FieldValue::Absent, FieldValue::Text),
                FieldValue::Text(p.race.clone()),
                FieldValue::Integer(p.ethnicity),
            ];
            Record {
                line: i + 2,
                fields: RECONCILED_COLUMNS
                    .iter()
                    .map(|c| c.to_string())
                    .zip(values)
                    .collect(),
            }
        })
        .collect();

    Table {
        headers: RECONCILED_COLUMNS.iter().map(|c| c.to_string()).collect(),
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PRIMARY_PERSON_KEY;
    use crate::pipeline::join::{join, JoinPolicy};
    use crate::pipeline::parser::{parse_table, write_table};
    use crate::types::{EnrollmentRecord, RosterRecord};

    /// Joined rows for two keys; A has two enrollment periods
    fn enriched_rows() -> Vec<JoinedRow> {
        let roster: Vec<RosterRecord> = parse_table(
            "PRIMARY_PERSON_KEY,MEM_GENDER,MEM_RACE,MEM_ETHNICITY,MEM_MSA_NAME\n\
             A,F,Japanese,3,X\n\
             B,M,Filipino,1,X",
        )
        .unwrap()
        .typed()
        .unwrap();
        let enrollment: Vec<EnrollmentRecord> = parse_table(
            "PRIMARY_PERSON_KEY,MEM_AGE,MEM_MSA_NAME\nA,80,X\nA,81,X\nB,70,X",
        )
        .unwrap()
        .typed()
        .unwrap();

        let mut rows = join(&roster, &enrollment, JoinPolicy::SingleKey);
        for row in rows.iter_mut() {
            row.name = Some(format!("Name {}", row.person_key));
        }
        rows
    }

    #[test]
    fn test_one_patient_per_key_from_first_row() {
        let rows = enriched_rows();
        assert_eq!(rows.len(), 3);

        let patients = project(&rows).unwrap();
        let keys: Vec<&str> = patients.iter().map(|p| p.person_key.as_str()).collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(patients[0].age, Some(80));
        assert_eq!(patients[0].gender.as_deref(), Some("F"));
    }

    #[test]
    fn test_projection_is_deterministic() {
        let rows = enriched_rows();
        assert_eq!(project(&rows).unwrap(), project(&rows).unwrap());
    }

    #[test]
    fn test_unimputed_row_is_missing_field() {
        let mut rows = enriched_rows();
        rows[2].race = None;
        assert!(matches!(project(&rows), Err(IntakeError::MissingField(ref c)) if c == MEM_RACE));
    }

    fn patient(key: &str) -> ReconciledPatient {
        ReconciledPatient {
            person_key: key.to_string(),
            name: "Kai Malu".to_string(),
            age: Some(83),
            gender: Some("M".to_string()),
            race: "Native Hawaiian or Pacific Islander".to_string(),
            ethnicity: 3,
        }
    }

    #[test]
    fn test_table_has_fixed_column_order() {
        let table = to_table(&[patient("A"), patient("B")]);
        assert_eq!(
            table.headers,
            vec![PRIMARY_PERSON_KEY, "NAME", "MEM_AGE", "MEM_GENDER", "MEM_RACE", "MEM_ETHNICITY"]
        );
        let text = write_table(&table).unwrap();
        let second_line = text.lines().nth(1).unwrap();
        assert_eq!(second_line, "A,Kai Malu,83,M,Native Hawaiian or Pacific Islander,3");
    }
}
