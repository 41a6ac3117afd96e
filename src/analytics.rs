//! Exercise adherence: distinct session days and the longest run of
//! consecutive days per (patient, routine).

use crate::domain::{AdherenceSummary, PatientRoutine, SessionEvent};
use crate::error::Result;
use crate::metrics::{emit_counter, MetricName};
use crate::storage::Storage;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

/// Total distinct session days and longest consecutive-day streak.
///
/// Several sessions on the same calendar day count once. No dates gives (0, 0).
pub fn adherence_from_dates<I>(dates: I) -> (u32, u32)
where
    I: IntoIterator<Item = NaiveDate>,
{
    let days: BTreeSet<NaiveDate> = dates.into_iter().collect();

    let mut longest = 0u32;
    let mut current = 0u32;
    let mut previous: Option<NaiveDate> = None;
    for day in &days {
        current = match previous {
            Some(prev) if (*day - prev).num_days() == 1 => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        previous = Some(*day);
    }

    (days.len() as u32, longest)
}

/// Adherence for one (patient, routine) pair from its session events.
///
/// Calendar days are taken in UTC. Events for other pairs are ignored.
pub fn summarize_pair(patient_id: i64, routine_id: i64, events: &[SessionEvent]) -> AdherenceSummary {
    let dates = events
        .iter()
        .filter(|e| e.patient_id == patient_id && e.routine_id == routine_id)
        .map(|e| e.completed_at.date_naive());
    let (total_sessions, longest_streak) = adherence_from_dates(dates);
    AdherenceSummary {
        patient_id,
        routine_id,
        total_sessions,
        longest_streak,
    }
}

/// Group a whole session log by (patient, routine) and summarize each pair,
/// ordered by patient then routine
pub fn summarize_sessions(events: &[SessionEvent]) -> Vec<AdherenceSummary> {
    let mut by_pair: BTreeMap<(i64, i64), Vec<NaiveDate>> = BTreeMap::new();
    for e in events {
        by_pair
            .entry((e.patient_id, e.routine_id))
            .or_default()
            .push(e.completed_at.date_naive());
    }

    by_pair
        .into_iter()
        .map(|((patient_id, routine_id), dates)| {
            let (total_sessions, longest_streak) = adherence_from_dates(dates);
            AdherenceSummary {
                patient_id,
                routine_id,
                total_sessions,
                longest_streak,
            }
        })
        .collect()
}

/// Adherence for a pair read from storage. A pair without sessions reports zeros.
#[instrument(skip(storage))]
pub fn get_exercise_adherence(storage: &dyn Storage, patient_id: i64, routine_id: i64) -> Result<AdherenceSummary> {
    let events = storage.fetch_session_events(patient_id, routine_id)?;
    emit_counter(MetricName::AdherenceQueries, 1);
    emit_counter(MetricName::SessionEventsScanned, events.len() as u64);

    let summary = summarize_pair(patient_id, routine_id, &events);
    debug!(
        total = summary.total_sessions,
        streak = summary.longest_streak,
        "computed adherence"
    );
    Ok(summary)
}

/// One assignment with its adherence, as shown on the garden view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GardenEntry {
    pub assignment: PatientRoutine,
    pub adherence: AdherenceSummary,
}

/// Every patient/routine assignment paired with its adherence
pub fn garden_report(storage: &dyn Storage) -> Result<Vec<GardenEntry>> {
    storage
        .fetch_patient_routines()?
        .into_iter()
        .map(|assignment| {
            let adherence = get_exercise_adherence(storage, assignment.patient_id, assignment.routine_id)?;
            Ok(GardenEntry { assignment, adherence })
        })
        .collect()
}
