use crate::pipeline::impute::ImputationScope;
use crate::pipeline::join::JoinedRow;
use crate::reference::ReferenceTables;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use tracing::warn;

/// Pick a display name for de-identified data from the (race, gender) pool.
///
/// Missing gender, a race without a pool, or an empty pool all yield the
/// default name. Never used for real member names.
pub fn synthesize_name<R: Rng + ?Sized>(
    tables: &ReferenceTables,
    race: Option<&str>,
    gender: Option<&str>,
    ethnicity: Option<i64>,
    rng: &mut R,
) -> String {
    let pool = match (race, gender) {
        (Some(race), Some(gender)) => tables.names_for(race, gender, ethnicity),
        _ => None,
    };
    match pool.and_then(|names| names.choose(rng)) {
        Some(name) => name.clone(),
        None => {
            warn!(race, gender, "no name pool, using default name");
            tables.default_name.clone()
        }
    }
}

/// Fill `name` on every row. Returns how many rows got the default name.
pub fn assign_names<R: Rng + ?Sized>(
    rows: &mut [JoinedRow],
    tables: &ReferenceTables,
    scope: ImputationScope,
    rng: &mut R,
) -> usize {
    let mut by_key: HashMap<String, String> = HashMap::new();
    let mut defaults = 0;

    for row in rows.iter_mut() {
        let name = match scope {
            ImputationScope::PerKey => {
                if let Some(existing) = by_key.get(&row.person_key) {
                    existing.clone()
                } else {
                    let name = synthesize_name(tables, row.race.as_deref(), row.gender.as_deref(), row.ethnicity, rng);
                    by_key.insert(row.person_key.clone(), name.clone());
                    name
                }
            }
            ImputationScope::PerRow => {
                synthesize_name(tables, row.race.as_deref(), row.gender.as_deref(), row.ethnicity, rng)
            }
        };
        if name == tables.default_name {
            defaults += 1;
        }
        row.name = Some(name);
    }

    defaults
}
