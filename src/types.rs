use crate::constants::*;
use crate::error::{IntakeError, Result};
use crate::pipeline::parser::Record;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of the membership roster extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterRecord {
    pub person_key: String,
    pub member_id: Option<String>,
    pub gender: Option<String>,
    /// Only present when the roster extract carries MEM_AGE
    pub age: Option<u32>,
    pub race: Option<String>,
    pub ethnicity: Option<i64>,
    pub zip3: Option<String>,
    pub msa_name: Option<String>,
    pub state: Option<String>,
}

/// Member-month utilization counts by benefit line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyUtilization {
    pub medical: Option<f64>,
    pub pharmacy: Option<f64>,
    pub dental: Option<f64>,
    pub vision: Option<f64>,
}

/// One row of the claims/enrollment extract, i.e. one coverage month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub person_key: String,
    pub member_id: Option<String>,
    pub month_start: Option<NaiveDate>,
    pub yearmo: Option<i64>,
    pub age: Option<u32>,
    /// Only present when the enrollment extract carries MEM_GENDER
    pub gender: Option<String>,
    pub relation: Option<String>,
    pub msa_name: Option<String>,
    pub payer_lob: Option<String>,
    pub payer_type: Option<String>,
    pub product_type: Option<String>,
    pub utilization: MonthlyUtilization,
    pub member_status: Option<String>,
    pub chronic_condition_id: Option<i64>,
    pub chronic_condition_desc: Option<String>,
}

/// Patient row produced by reconciliation and handed to storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledPatient {
    pub person_key: String,
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub race: String,
    pub ethnicity: i64,
}

/// Columns the roster extract must carry
pub const ROSTER_REQUIRED_COLUMNS: [&str; 5] = [
    PRIMARY_PERSON_KEY,
    MEM_GENDER,
    MEM_RACE,
    MEM_ETHNICITY,
    MEM_MSA_NAME,
];

/// Columns the enrollment extract must carry
pub const ENROLLMENT_REQUIRED_COLUMNS: [&str; 3] = [PRIMARY_PERSON_KEY, MEM_AGE, MEM_MSA_NAME];

fn member_age(record: &Record) -> Result<Option<u32>> {
    match record.integer(MEM_AGE)? {
        Some(age) => u32::try_from(age)
            .map(Some)
            .map_err(|_| IntakeError::malformed(record.line, format!("{MEM_AGE} {age} is out of range"))),
        None => Ok(None),
    }
}

fn identity_key(record: &Record) -> Result<String> {
    record.text(PRIMARY_PERSON_KEY).ok_or_else(|| {
        IntakeError::malformed(record.line, format!("{PRIMARY_PERSON_KEY} is empty"))
    })
}

impl TryFrom<&Record> for RosterRecord {
    type Error = IntakeError;

    fn try_from(record: &Record) -> Result<Self> {
        Ok(Self {
            person_key: identity_key(record)?,
            member_id: record.text(MEMBER_ID),
            gender: record.text(MEM_GENDER),
            age: member_age(record)?,
            race: record.text(MEM_RACE),
            ethnicity: record.integer(MEM_ETHNICITY)?,
            zip3: record.text(MEM_ZIP3),
            msa_name: record.text(MEM_MSA_NAME),
            state: record.text(MEM_STATE),
        })
    }
}

impl TryFrom<&Record> for EnrollmentRecord {
    type Error = IntakeError;

    fn try_from(record: &Record) -> Result<Self> {
        let month_start = match record.text(MEMBER_MONTH_START_DATE) {
            Some(raw) => Some(
                NaiveDate::parse_from_str(&raw, MONTH_START_FORMAT).map_err(|e| {
                    IntakeError::malformed(
                        record.line,
                        format!("{MEMBER_MONTH_START_DATE} '{raw}' is not a date: {e}"),
                    )
                })?,
            ),
            None => None,
        };

        Ok(Self {
            person_key: identity_key(record)?,
            member_id: record.text(MEMBER_ID),
            month_start,
            yearmo: record.integer(YEARMO)?,
            age: member_age(record)?,
            gender: record.text(MEM_GENDER),
            relation: record.text(RELATION),
            msa_name: record.text(MEM_MSA_NAME),
            payer_lob: record.text(PAYER_LOB),
            payer_type: record.text(PAYER_TYPE),
            product_type: record.text(PROD_TYPE),
            utilization: MonthlyUtilization {
                medical: record.float(QTY_MM_MD)?,
                pharmacy: record.float(QTY_MM_RX)?,
                dental: record.float(QTY_MM_DN)?,
                vision: record.float(QTY_MM_VS)?,
            },
            member_status: record.text(MEM_STAT),
            chronic_condition_id: record.integer(CHRONIC_CONDITION_ID)?,
            chronic_condition_desc: record.text(CHRONIC_CONDITION_DESC),
        })
    }
}
