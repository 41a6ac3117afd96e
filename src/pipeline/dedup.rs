use crate::types::RosterRecord;
use std::collections::HashSet;
use tracing::debug;

/// Drop roster rows repeating an (identity key, metro area) pair.
///
/// The first row seen in input order is kept. A patient may appear once per
/// metro-area history entry, so rows for the same key in different areas
/// all survive.
pub fn dedup_roster(records: Vec<RosterRecord>) -> Vec<RosterRecord> {
    let mut seen: HashSet<(String, Option<String>)> = HashSet::with_capacity(records.len());
    let mut kept = Vec::with_capacity(records.len());

    for record in records {
        let key = (record.person_key.clone(), record.msa_name.clone());
        if seen.insert(key) {
            kept.push(record);
        } else {
            debug!(
                person_key = %record.person_key,
                msa = record.msa_name.as_deref().unwrap_or(""),
                "dropping duplicate roster row"
            );
        }
    }

    kept
}
