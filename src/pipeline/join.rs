use crate::types::{EnrollmentRecord, RosterRecord};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// How roster rows are matched to enrollment periods
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinPolicy {
    /// Join on identity key alone
    #[default]
    SingleKey,
    /// Keep only roster rows whose metro area matches an enrollment period for
    /// the same key, then join those rows on identity key
    TwoStage,
}

impl FromStr for JoinPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single-key" | "single" | "a" => Ok(JoinPolicy::SingleKey),
            "two-stage" | "two" | "b" => Ok(JoinPolicy::TwoStage),
            other => Err(format!(
                "unknown join policy '{other}' (expected single-key or two-stage)"
            )),
        }
    }
}

impl fmt::Display for JoinPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinPolicy::SingleKey => f.write_str("single-key"),
            JoinPolicy::TwoStage => f.write_str("two-stage"),
        }
    }
}

/// Which source a collided column is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Roster,
    Enrollment,
}

/// Per-cell precedence for a collided column: the preferred value, else the other one
pub fn resolve<T: Clone>(preferred: Option<&T>, other: Option<&T>) -> Option<T> {
    preferred.or(other).cloned()
}

/// Pick the source for a collided column.
///
/// The roster column wins when it is populated on every joined row;
/// otherwise the enrollment column does. `resolve_column` still fills a cell
/// the chosen column lacks from the other source's cell.
pub fn preferred_source<T>(roster_column: &[Option<T>]) -> Source {
    if roster_column.iter().all(Option::is_some) {
        Source::Roster
    } else {
        Source::Enrollment
    }
}

/// Resolve a collided column across all joined rows
pub fn resolve_column<T: Clone>(roster_column: &[Option<T>], enrollment_column: &[Option<T>]) -> Vec<Option<T>> {
    let source = preferred_source(roster_column);
    roster_column
        .iter()
        .zip(enrollment_column)
        .map(|(r, e)| match source {
            Source::Roster => resolve(r.as_ref(), e.as_ref()),
            Source::Enrollment => resolve(e.as_ref(), r.as_ref()),
        })
        .collect()
}

/// One roster row matched with one enrollment period.
///
/// `member_id`, `msa_name`, `gender` and `age` are the collision-resolved
/// values of columns both extracts can carry. `race`, `ethnicity` and `name`
/// start from the roster values and are filled in by imputation and name
/// synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub person_key: String,
    pub member_id: Option<String>,
    pub msa_name: Option<String>,
    pub gender: Option<String>,
    pub age: Option<u32>,
    pub roster: RosterRecord,
    pub enrollment: EnrollmentRecord,
    pub race: Option<String>,
    pub ethnicity: Option<i64>,
    pub name: Option<String>,
}

impl JoinedRow {
    fn new(roster: &RosterRecord, enrollment: &EnrollmentRecord) -> Self {
        Self {
            person_key: roster.person_key.clone(),
            member_id: None,
            msa_name: None,
            gender: None,
            age: None,
            race: roster.race.clone(),
            ethnicity: roster.ethnicity,
            name: None,
            roster: roster.clone(),
            enrollment: enrollment.clone(),
        }
    }

}

/// Roster rows whose (identity key, metro area) matches at least one
/// enrollment period. Rows without a metro area never match.
pub fn filter_by_active_area<'a>(
    roster: &'a [RosterRecord],
    enrollment: &[EnrollmentRecord],
) -> Vec<&'a RosterRecord> {
    let active: HashSet<(&str, &str)> = enrollment
        .iter()
        .filter_map(|e| e.msa_name.as_deref().map(|msa| (e.person_key.as_str(), msa)))
        .collect();

    roster
        .iter()
        .filter(|r| {
            let matched = r
                .msa_name
                .as_deref()
                .map_or(false, |msa| active.contains(&(r.person_key.as_str(), msa)));
            if !matched {
                debug!(person_key = %r.person_key, "roster row has no enrollment in its metro area");
            }
            matched
        })
        .collect()
}

fn collided<T, F, G>(rows: &[JoinedRow], roster: F, enrollment: G) -> Vec<Option<T>>
where
    T: Clone,
    F: Fn(&RosterRecord) -> Option<T>,
    G: Fn(&EnrollmentRecord) -> Option<T>,
{
    let roster_column: Vec<Option<T>> = rows.iter().map(|row| roster(&row.roster)).collect();
    let enrollment_column: Vec<Option<T>> = rows.iter().map(|row| enrollment(&row.enrollment)).collect();
    resolve_column(&roster_column, &enrollment_column)
}

/// Fill the columns both extracts can carry, one whole-column decision each
fn resolve_collisions(rows: &mut [JoinedRow]) {
    let member_ids = collided(rows, |r| r.member_id.clone(), |e| e.member_id.clone());
    let msa_names = collided(rows, |r| r.msa_name.clone(), |e| e.msa_name.clone());
    let genders = collided(rows, |r| r.gender.clone(), |e| e.gender.clone());
    let ages = collided(rows, |r| r.age, |e| e.age);

    let resolved = member_ids.into_iter().zip(msa_names).zip(genders).zip(ages);
    for (row, (((member_id, msa_name), gender), age)) in rows.iter_mut().zip(resolved) {
        row.member_id = member_id;
        row.msa_name = msa_name;
        row.gender = gender;
        row.age = age;
    }
}

/// Inner join of roster and enrollment rows under the given policy.
///
/// Output follows roster order, then enrollment order within a key. An empty
/// result is a normal outcome when no identity keys overlap.
pub fn join(roster: &[RosterRecord], enrollment: &[EnrollmentRecord], policy: JoinPolicy) -> Vec<JoinedRow> {
    let selected: Vec<&RosterRecord> = match policy {
        JoinPolicy::SingleKey => roster.iter().collect(),
        JoinPolicy::TwoStage => filter_by_active_area(roster, enrollment),
    };

    let mut periods: HashMap<&str, Vec<&EnrollmentRecord>> = HashMap::new();
    for e in enrollment {
        periods.entry(e.person_key.as_str()).or_default().push(e);
    }

    let mut rows: Vec<JoinedRow> = Vec::new();
    for r in selected {
        if let Some(matches) = periods.get(r.person_key.as_str()) {
            rows.extend(matches.iter().map(|e| JoinedRow::new(r, e)));
        }
    }

    resolve_collisions(&mut rows);

    info!(policy = %policy, roster = roster.len(), enrollment = enrollment.len(), joined = rows.len(), "joined extracts");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MonthlyUtilization;

    fn roster(key: &str, msa: &str) -> RosterRecord {
        RosterRecord {
            person_key: key.to_string(),
            member_id: Some(format!("R-{key}")),
            gender: Some("M".to_string()),
            age: None,
            race: None,
            ethnicity: None,
            zip3: None,
            msa_name: Some(msa.to_string()),
            state: None,
        }
    }

    fn enrollment(key: &str, msa: &str, age: u32) -> EnrollmentRecord {
        EnrollmentRecord {
            person_key: key.to_string(),
            member_id: Some(format!("E-{key}")),
            month_start: None,
            yearmo: None,
            age: Some(age),
            gender: None,
            relation: None,
            msa_name: Some(msa.to_string()),
            payer_lob: None,
            payer_type: None,
            product_type: None,
            utilization: MonthlyUtilization::default(),
            member_status: None,
            chronic_condition_id: None,
            chronic_condition_desc: None,
        }
    }

    #[test]
    fn test_resolve_prefers_preferred_value() {
        assert_eq!(resolve(Some(&1), Some(&2)), Some(1));
        assert_eq!(resolve(None, Some(&2)), Some(2));
        assert_eq!(resolve::<i32>(None, None), None);
    }

    #[test]
    fn test_complete_roster_column_wins() {
        let resolved = resolve_column(&[Some("r1"), Some("r2")], &[Some("e1"), None]);
        assert_eq!(resolved, vec![Some("r1"), Some("r2")]);
    }

    #[test]
    fn test_incomplete_roster_column_falls_back_to_enrollment() {
        let resolved = resolve_column(&[Some("r1"), None, Some("r3")], &[Some("e1"), Some("e2"), None]);
        // enrollment is preferred for the whole column; gaps still fall back per cell
        assert_eq!(resolved, vec![Some("e1"), Some("e2"), Some("r3")]);
    }

    #[test]
    fn test_single_key_join_fans_out_per_period() {
        let r = vec![roster("A", "FLINT, MI"), roster("B", "FLINT, MI")];
        let e = vec![
            enrollment("A", "FLINT, MI", 75),
            enrollment("C", "FLINT, MI", 80),
            enrollment("A", "NON-MSA AREA, MI", 76),
        ];
        let rows = join(&r, &e, JoinPolicy::SingleKey);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.person_key == "A"));
        assert_eq!(rows[0].age, Some(75));
        assert_eq!(rows[1].age, Some(76));
        assert_eq!(rows[0].member_id.as_deref(), Some("R-A"));
        assert_eq!(rows[0].gender.as_deref(), Some("M"));
    }

    #[test]
    fn test_gender_falls_back_to_enrollment_column() {
        let mut r = roster("A", "X");
        r.gender = None;
        let mut e = enrollment("A", "X", 80);
        e.gender = Some("F".to_string());

        let rows = join(&[r], &[e], JoinPolicy::SingleKey);
        assert_eq!(rows[0].gender.as_deref(), Some("F"));
        assert_eq!(rows[0].age, Some(80));
    }

    #[test]
    fn test_complete_roster_age_wins_over_enrollment() {
        let mut a = roster("A", "X");
        a.age = Some(90);
        let mut b = roster("B", "X");
        b.age = Some(91);
        let rows = join(
            &[a, b],
            &[enrollment("A", "X", 70), enrollment("B", "X", 71)],
            JoinPolicy::SingleKey,
        );
        assert_eq!(rows.iter().map(|row| row.age).collect::<Vec<_>>(), vec![Some(90), Some(91)]);
    }

    #[test]
    fn test_partial_roster_age_defers_to_enrollment() {
        let mut a = roster("A", "X");
        a.age = Some(90);
        let rows = join(
            &[a, roster("B", "X")],
            &[enrollment("A", "X", 70), enrollment("B", "X", 71)],
            JoinPolicy::SingleKey,
        );
        assert_eq!(rows.iter().map(|row| row.age).collect::<Vec<_>>(), vec![Some(70), Some(71)]);
    }

    #[test]
    fn test_two_stage_excludes_rows_outside_active_area() {
        let r = vec![roster("A", "URBAN HONOLULU, HI"), roster("A", "FLINT, MI")];
        let e = vec![enrollment("A", "FLINT, MI", 75)];

        let single = join(&r, &e, JoinPolicy::SingleKey);
        assert_eq!(single.len(), 2);

        let two_stage = join(&r, &e, JoinPolicy::TwoStage);
        assert_eq!(two_stage.len(), 1);
        assert_eq!(two_stage[0].roster.msa_name.as_deref(), Some("FLINT, MI"));
    }

    #[test]
    fn test_no_overlap_is_empty_not_error() {
        let rows = join(&[roster("A", "X")], &[enrollment("B", "X", 70)], JoinPolicy::TwoStage);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_join_policy_parses_aliases() {
        assert_eq!("two-stage".parse::<JoinPolicy>().unwrap(), JoinPolicy::TwoStage);
        assert_eq!("A".parse::<JoinPolicy>().unwrap(), JoinPolicy::SingleKey);
        assert!("sideways".parse::<JoinPolicy>().is_err());
    }
}
