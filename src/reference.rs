//! Closed category sets and lookup tables used by imputation and name synthesis.
//!
//! The tables are immutable once loaded and are passed explicitly to the
//! imputer and name synthesizer, so tests can substitute their own.

use crate::constants::{DEFAULT_NAME, ETHNICITY_HISPANIC, ETHNICITY_NOT_HISPANIC, ETHNICITY_UNKNOWN};
use crate::error::{IntakeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Names for one (race, gender) pair, optionally restricted to one ethnicity code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamePool {
    pub race: String,
    pub gender: String,
    #[serde(default)]
    pub ethnicity: Option<i64>,
    pub names: Vec<String>,
}

impl NamePool {
    fn new(race: &str, gender: &str, ethnicity: Option<i64>, names: &[&str]) -> Self {
        Self {
            race: race.to_string(),
            gender: gender.to_string(),
            ethnicity,
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTables {
    pub race_categories: Vec<String>,
    pub ethnicity_by_race: BTreeMap<String, i64>,
    /// Ethnicity for a race outside `race_categories`
    #[serde(default = "default_ethnicity")]
    pub default_ethnicity: i64,
    pub name_pools: Vec<NamePool>,
    #[serde(default = "default_name")]
    pub default_name: String,
}

fn default_ethnicity() -> i64 {
    ETHNICITY_UNKNOWN
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

impl Default for ReferenceTables {
    fn default() -> Self {
        let races = [
            ("Caucasian", ETHNICITY_NOT_HISPANIC),
            ("Native Hawaiian or Pacific Islander", ETHNICITY_UNKNOWN),
            ("Portuguese", ETHNICITY_NOT_HISPANIC),
            ("Filipino", ETHNICITY_HISPANIC),
            ("Japanese", ETHNICITY_UNKNOWN),
            ("Chinese", ETHNICITY_UNKNOWN),
        ];

        let name_pools = vec![
            NamePool::new("Caucasian", "M", Some(ETHNICITY_NOT_HISPANIC), &["Alexander Baldwin", "Henry Perrine", "Ethan Taylor"]),
            NamePool::new("Caucasian", "F", Some(ETHNICITY_NOT_HISPANIC), &["Emily Cooke", "Olivia Brown", "Sophia Harris"]),
            NamePool::new("Caucasian", "M", None, &["Juan Garcia", "Carlos Diaz", "Miguel Torres"]),
            NamePool::new("Caucasian", "F", None, &["Maria Gonzalez", "Isabella Martinez", "Ana Lopez"]),
            NamePool::new("Native Hawaiian or Pacific Islander", "M", None, &["Kai Malu", "Noa Kaipo", "Lani Kealoha"]),
            NamePool::new("Native Hawaiian or Pacific Islander", "F", None, &["Leilani Aloha", "Moana Kea", "Halia Lani"]),
            NamePool::new("Portuguese", "M", None, &["Antonio Silva", "Manuel Sousa", "Joao Mendes"]),
            NamePool::new("Portuguese", "F", None, &["Sofia Costa", "Isabel Ferreira", "Ana Oliveira"]),
            NamePool::new("Filipino", "M", None, &["Jose Rizal", "Andres Bonifacio", "Manuel Quezon"]),
            NamePool::new("Filipino", "F", None, &["Maria Clara", "Gabriela Silang", "Corazon Aquino"]),
            NamePool::new("Japanese", "M", None, &["Greg Tanaka", "Hiroshi Yamamoto", "Steve Suzuki"]),
            NamePool::new("Japanese", "F", None, &["Mary Sato", "Akiko Nakamura", "Eunice Takahashi"]),
            NamePool::new("Chinese", "M", None, &["David Zhang", "Li Wei", "John Wang"]),
            NamePool::new("Chinese", "F", None, &["Bill Mei", "Xiao Hong", "Joseph Yi"]),
        ];

        Self {
            race_categories: races.iter().map(|(r, _)| r.to_string()).collect(),
            ethnicity_by_race: races.iter().map(|(r, e)| (r.to_string(), *e)).collect(),
            default_ethnicity: ETHNICITY_UNKNOWN,
            name_pools,
            default_name: DEFAULT_NAME.to_string(),
        }
    }
}

impl ReferenceTables {
    /// Reject tables the imputer could not draw from consistently
    pub fn validate(&self) -> Result<()> {
        if self.race_categories.is_empty() {
            return Err(IntakeError::Config("race_categories must not be empty".to_string()));
        }
        if let Some(race) = self
            .race_categories
            .iter()
            .find(|r| !self.ethnicity_by_race.contains_key(*r))
        {
            return Err(IntakeError::Config(format!("race '{race}' has no ethnicity mapping")));
        }
        if let Some(pool) = self.name_pools.iter().find(|p| p.names.is_empty()) {
            return Err(IntakeError::Config(format!(
                "name pool for {} / {} is empty",
                pool.race, pool.gender
            )));
        }
        Ok(())
    }

    pub fn is_known_race(&self, race: &str) -> bool {
        self.race_categories.iter().any(|r| r == race)
    }

    /// Ethnicity code derived from race; unknown races get the default code
    pub fn ethnicity_for(&self, race: &str) -> i64 {
        self.ethnicity_by_race
            .get(race)
            .copied()
            .unwrap_or(self.default_ethnicity)
    }

    /// Name pool for (race, gender). An ethnicity-qualified pool that matches
    /// wins over the unqualified pool for the same pair.
    pub fn names_for(&self, race: &str, gender: &str, ethnicity: Option<i64>) -> Option<&[String]> {
        let candidates = self
            .name_pools
            .iter()
            .filter(|p| p.race == race && p.gender.eq_ignore_ascii_case(gender));

        let mut fallback = None;
        for pool in candidates {
            match pool.ethnicity {
                Some(code) if ethnicity == Some(code) => return Some(pool.names.as_slice()),
                Some(_) => {}
                None if fallback.is_none() => fallback = Some(pool.names.as_slice()),
                None => {}
            }
        }
        fallback
    }
}
