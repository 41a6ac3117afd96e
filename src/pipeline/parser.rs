use crate::error::{IntakeError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

// Leading zeros mark codes (e.g. "067"), which stay text
static INTEGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(0|[1-9][0-9]*)$").expect("valid integer pattern"));
static FLOAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(0|[1-9][0-9]*)\.[0-9]+$").expect("valid float pattern"));

/// A single cell of a tabular extract.
///
/// `Absent` is distinct from zero and from the empty string: imputation only
/// fires on absent values.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Absent,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Classify a raw (already trimmed) cell
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return FieldValue::Absent;
        }
        if INTEGER_RE.is_match(raw) {
            if let Ok(value) = raw.parse::<i64>() {
                return FieldValue::Integer(value);
            }
        } else if FLOAT_RE.is_match(raw) {
            if let Ok(value) = raw.parse::<f64>() {
                return FieldValue::Float(value);
            }
        }
        FieldValue::Text(raw.to_string())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    /// Render the value back to its cell text
    pub fn to_raw(&self) -> String {
        match self {
            FieldValue::Absent => String::new(),
            FieldValue::Integer(v) => v.to_string(),
            // Plain decimal notation with a point, so the cell reparses as a float
            FieldValue::Float(v) => {
                let text = v.to_string();
                if text.contains('.') || !v.is_finite() {
                    text
                } else {
                    format!("{text}.0")
                }
            }
            FieldValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw())
    }
}

/// One data row keyed by header name
#[derive(Debug, Clone)]
pub struct Record {
    /// 1-based line in the source block
    pub line: usize,
    pub fields: HashMap<String, FieldValue>,
}

// Records compare by field set; source line is provenance only
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Record {
    pub fn get(&self, column: &str) -> &FieldValue {
        self.fields.get(column).unwrap_or(&FieldValue::Absent)
    }

    /// Any present value rendered as text
    pub fn text(&self, column: &str) -> Option<String> {
        match self.get(column) {
            FieldValue::Absent => None,
            other => Some(other.to_raw()),
        }
    }

    /// Integer value; integral floats such as `102.0` are accepted
    pub fn integer(&self, column: &str) -> Result<Option<i64>> {
        match self.get(column) {
            FieldValue::Absent => Ok(None),
            FieldValue::Integer(v) => Ok(Some(*v)),
            FieldValue::Float(v) if v.fract() == 0.0 => Ok(Some(*v as i64)),
            other => Err(IntakeError::malformed(
                self.line,
                format!("{column} '{other}' is not an integer"),
            )),
        }
    }

    pub fn float(&self, column: &str) -> Result<Option<f64>> {
        match self.get(column) {
            FieldValue::Absent => Ok(None),
            FieldValue::Integer(v) => Ok(Some(*v as f64)),
            FieldValue::Float(v) => Ok(Some(*v)),
            other => Err(IntakeError::malformed(
                self.line,
                format!("{column} '{other}' is not a number"),
            )),
        }
    }
}

/// A parsed extract: header order plus records in input order
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Fail with `MissingField` for the first required column the header lacks
    pub fn require_columns(&self, columns: &[&str]) -> Result<()> {
        match columns.iter().find(|c| !self.has_column(c)) {
            Some(missing) => Err(IntakeError::MissingField((*missing).to_string())),
            None => Ok(()),
        }
    }

    /// Convert every record into a typed row
    pub fn typed<T>(&self) -> Result<Vec<T>>
    where
        T: for<'a> TryFrom<&'a Record, Error = IntakeError>,
    {
        self.records.iter().map(T::try_from).collect()
    }
}

/// Parse a comma-delimited, double-quote escaped block with a header row.
///
/// The block is trimmed before parsing; blank lines are skipped. A missing
/// header or a row whose arity differs from the header is `MalformedInput`.
pub fn parse_table(text: &str) -> Result<Table> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(IntakeError::malformed(1, "missing header row"));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(trimmed.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().any(|h| h.is_empty()) {
        return Err(IntakeError::malformed(1, "header row has an empty column name"));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = headers.iter().find(|h| !seen.insert(h.as_str())) {
        return Err(IntakeError::malformed(1, format!("duplicate column '{dup}'")));
    }

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        let line = row.position().map(|p| p.line() as usize).unwrap_or(0);
        if row.len() != headers.len() {
            return Err(IntakeError::malformed(
                line,
                format!("expected {} fields, found {}", headers.len(), row.len()),
            ));
        }
        let fields = headers
            .iter()
            .zip(row.iter())
            .map(|(h, raw)| (h.clone(), FieldValue::parse(raw)))
            .collect();
        records.push(Record { line, fields });
    }

    debug!("parsed {} records with {} columns", records.len(), headers.len());
    Ok(Table { headers, records })
}

/// Serialize a table back to a comma-delimited block with the same header
pub fn write_table(table: &Table) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.headers)?;
    for record in &table.records {
        writer.write_record(table.headers.iter().map(|h| record.get(h).to_raw()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| IntakeError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_cells() {
        assert_eq!(FieldValue::parse(""), FieldValue::Absent);
        assert_eq!(FieldValue::parse("76"), FieldValue::Integer(76));
        assert_eq!(FieldValue::parse("102.0"), FieldValue::Float(102.0));
        assert_eq!(FieldValue::parse("067"), FieldValue::Text("067".to_string()));
        assert_eq!(
            FieldValue::parse("1E9F89247B2EA224292BDA829"),
            FieldValue::Text("1E9F89247B2EA224292BDA829".to_string())
        );
    }

    #[test]
    fn test_empty_cells_are_absent_not_zero() {
        let table = parse_table("KEY,RACE,ETH\nA,,\n").unwrap();
        let record = &table.records[0];
        assert!(record.get("RACE").is_absent());
        assert_eq!(record.integer("ETH").unwrap(), None);
        assert_eq!(record.text("RACE"), None);
    }

    #[test]
    fn test_trims_block_and_reads_quoted_commas() {
        let text = "\n   KEY,MSA\n   A,\"URBAN HONOLULU, HI\"\n   B,\"FLINT, MI\"\n\n";
        let table = parse_table(text).unwrap();
        assert_eq!(table.headers, vec!["KEY", "MSA"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].text("MSA").as_deref(), Some("URBAN HONOLULU, HI"));
        assert_eq!(table.records[1].text("KEY").as_deref(), Some("B"));
    }

    #[test]
    fn test_missing_header_is_malformed() {
        let err = parse_table("   \n  ").unwrap_err();
        assert!(matches!(err, IntakeError::MalformedInput { line: 1, .. }));
    }

    #[test]
    fn test_arity_mismatch_is_malformed() {
        let err = parse_table("A,B,C\n1,2,3\n4,5\n").unwrap_err();
        match err {
            IntakeError::MalformedInput { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("expected 3 fields, found 2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_header_is_malformed() {
        assert!(matches!(
            parse_table("A,A\n1,2"),
            Err(IntakeError::MalformedInput { .. })
        ));
    }

    #[test]
    fn test_reparse_of_written_table_is_equal() {
        let text = "KEY,AGE,QTY,MSA,RACE\n\
                    X1,76,0.0,\"FLINT, MI\",\n\
                    X2,,1.5,\"He said \"\"hi\"\"\",Japanese\n";
        let table = parse_table(text).unwrap();
        let written = write_table(&table).unwrap();
        let reparsed = parse_table(&written).unwrap();
        assert_eq!(table, reparsed);
    }

    #[test]
    fn test_large_and_small_floats_stay_floats() {
        let text = "K,Q
A,100000000000000000000.0
B,0.0000001
C,102.0
";
        let table = parse_table(text).unwrap();
        assert_eq!(table.records[0].get("Q"), &FieldValue::Float(1e20));

        let written = write_table(&table).unwrap();
        assert!(written.contains("100000000000000000000.0"));
        assert!(written.contains("102.0"));
        let reparsed = parse_table(&written).unwrap();
        assert_eq!(table, reparsed);
        assert_eq!(reparsed.records[1].get("Q"), &FieldValue::Float(1e-7));
    }

    #[test]
    fn test_require_columns_names_missing_column() {
        let table = parse_table("A,B\n1,2").unwrap();
        assert!(table.require_columns(&["A", "B"]).is_ok());
        match table.require_columns(&["A", "C"]) {
            Err(IntakeError::MissingField(col)) => assert_eq!(col, "C"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_integer_accepts_integral_float_only() {
        let table = parse_table("ID,BAD\n102.0,1.5").unwrap();
        let record = &table.records[0];
        assert_eq!(record.integer("ID").unwrap(), Some(102));
        assert!(record.integer("BAD").is_err());
    }
}
