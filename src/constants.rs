/// Column names used by the membership roster and claims/enrollment extracts.
/// Both extracts share the identity key, member key and metro-area columns.

// Shared columns
pub const PRIMARY_PERSON_KEY: &str = "PRIMARY_PERSON_KEY";
pub const MEMBER_ID: &str = "MEMBER_ID";
pub const MEM_MSA_NAME: &str = "MEM_MSA_NAME";

// Roster-only columns
pub const MEM_GENDER: &str = "MEM_GENDER";
pub const MEM_RACE: &str = "MEM_RACE";
pub const MEM_ETHNICITY: &str = "MEM_ETHNICITY";
pub const MEM_ZIP3: &str = "MEM_ZIP3";
pub const MEM_STATE: &str = "MEM_STATE";

// Enrollment-only columns
pub const MEMBER_MONTH_START_DATE: &str = "MEMBER_MONTH_START_DATE";
pub const YEARMO: &str = "YEARMO";
pub const MEM_AGE: &str = "MEM_AGE";
pub const RELATION: &str = "RELATION";
pub const PAYER_LOB: &str = "PAYER_LOB";
pub const PAYER_TYPE: &str = "PAYER_TYPE";
pub const PROD_TYPE: &str = "PROD_TYPE";
pub const QTY_MM_MD: &str = "QTY_MM_MD";
pub const QTY_MM_RX: &str = "QTY_MM_RX";
pub const QTY_MM_DN: &str = "QTY_MM_DN";
pub const QTY_MM_VS: &str = "QTY_MM_VS";
pub const MEM_STAT: &str = "MEM_STAT";
pub const CHRONIC_CONDITION_ID: &str = "PRIMARY_CHRONIC_CONDITION_ROLLUP_ID";
pub const CHRONIC_CONDITION_DESC: &str = "PRIMARY_CHRONIC_CONDITION_ROLLUP_DESC";

// Projected column, synthesized during reconciliation
pub const NAME: &str = "NAME";

/// Columns of the reconciled patient table, in output order
pub const RECONCILED_COLUMNS: [&str; 6] = [
    PRIMARY_PERSON_KEY,
    NAME,
    MEM_AGE,
    MEM_GENDER,
    MEM_RACE,
    MEM_ETHNICITY,
];

// Ethnicity codes carried by the extracts
pub const ETHNICITY_HISPANIC: i64 = 1;
pub const ETHNICITY_NOT_HISPANIC: i64 = 2;
pub const ETHNICITY_UNKNOWN: i64 = 3;

/// Name used when gender is missing or the race has no name pool
pub const DEFAULT_NAME: &str = "Taylor Morgan";

/// Date format of MEMBER_MONTH_START_DATE
pub const MONTH_START_FORMAT: &str = "%Y-%m-%d";
