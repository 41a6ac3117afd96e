use crate::error::Result;
use crate::pipeline::join::JoinedRow;
use crate::reference::ReferenceTables;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// When race and ethnicity are drawn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImputationPolicy {
    /// Draw only when race is absent; observed values are kept
    #[default]
    FillMissing,
    /// Draw for every row, replacing observed values
    AlwaysReroll,
}

/// Whether one draw covers every row of an identity key or each row draws alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImputationScope {
    #[default]
    PerKey,
    PerRow,
}

impl FromStr for ImputationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fill-missing" => Ok(ImputationPolicy::FillMissing),
            "always-reroll" => Ok(ImputationPolicy::AlwaysReroll),
            other => Err(format!("unknown imputation policy '{other}'")),
        }
    }
}

impl FromStr for ImputationScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-key" => Ok(ImputationScope::PerKey),
            "per-row" => Ok(ImputationScope::PerRow),
            other => Err(format!("unknown imputation scope '{other}'")),
        }
    }
}

/// Counts from one imputation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImputationOutcome {
    /// Rows whose race came from a draw or from another row of the same key
    pub imputed: usize,
    /// Rows that kept their observed race
    pub observed: usize,
    /// Observed races outside the closed category set
    pub unknown_races: usize,
}

/// Fills race and ethnicity on joined rows.
///
/// Drawn races come uniformly from the closed category set; the ethnicity of
/// a drawn race is always the lookup value for that race.
pub struct DemographicImputer<'a> {
    tables: &'a ReferenceTables,
    policy: ImputationPolicy,
    scope: ImputationScope,
}

impl<'a> DemographicImputer<'a> {
    pub fn new(tables: &'a ReferenceTables, policy: ImputationPolicy, scope: ImputationScope) -> Result<Self> {
        tables.validate()?;
        Ok(Self { tables, policy, scope })
    }

    /// Draw one race and its derived ethnicity
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> (String, i64) {
        // validate() guarantees a non-empty category set
        let idx = rng.gen_range(0..self.tables.race_categories.len());
        let race = self.tables.race_categories[idx].clone();
        let ethnicity = self.tables.ethnicity_for(&race);
        (race, ethnicity)
    }

    pub fn impute<R: Rng + ?Sized>(&self, rows: &mut [JoinedRow], rng: &mut R) -> ImputationOutcome {
        let mut outcome = ImputationOutcome::default();
        let mut by_key: HashMap<String, (String, i64)> = HashMap::new();

        // Per key, an observed race on any row settles the key's absent rows
        if self.scope == ImputationScope::PerKey && self.policy == ImputationPolicy::FillMissing {
            for row in rows.iter() {
                if let Some(race) = &row.race {
                    let ethnicity = row.ethnicity.unwrap_or_else(|| self.tables.ethnicity_for(race));
                    by_key
                        .entry(row.person_key.clone())
                        .or_insert_with(|| (race.clone(), ethnicity));
                }
            }
        }

        for row in rows.iter_mut() {
            let needs_draw = self.policy == ImputationPolicy::AlwaysReroll || row.race.is_none();

            if !needs_draw {
                if let Some(race) = row.race.as_deref() {
                    if !self.tables.is_known_race(race) {
                        warn!(person_key = %row.person_key, race, "observed race outside category set");
                        outcome.unknown_races += 1;
                    }
                    if row.ethnicity.is_none() {
                        row.ethnicity = Some(self.tables.ethnicity_for(race));
                    }
                }
                outcome.observed += 1;
                continue;
            }

            let (race, ethnicity) = match self.scope {
                ImputationScope::PerKey => by_key
                    .entry(row.person_key.clone())
                    .or_insert_with(|| self.draw(rng))
                    .clone(),
                ImputationScope::PerRow => self.draw(rng),
            };
            debug!(person_key = %row.person_key, race = %race, ethnicity, "imputed race");
            row.race = Some(race);
            row.ethnicity = Some(ethnicity);
            outcome.imputed += 1;
        }

        outcome
    }
}
