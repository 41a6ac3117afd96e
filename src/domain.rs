use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single exercise that routines are composed of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: i64,
    pub name: String,
    /// Routine phase, e.g. warm-up, main or cool-down
    pub phase: String,
    pub description: String,
    pub video: Option<String>,
}

/// Arguments for creating an exercise
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExercise {
    pub name: String,
    pub phase: String,
    pub description: String,
    pub video: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    pub id: i64,
    pub name: String,
    pub music: Option<String>,
}

/// A stored patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub person_key: String,
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub race: String,
    pub ethnicity: i64,
}

/// A routine assigned to a patient, with display names resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRoutine {
    pub patient_id: i64,
    pub patient_name: String,
    pub routine_id: i64,
    pub routine_name: String,
}

/// One completed exercise session from the session log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub patient_id: i64,
    pub routine_id: i64,
    pub completed_at: DateTime<Utc>,
}

/// Adherence metrics for one (patient, routine) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdherenceSummary {
    pub patient_id: i64,
    pub routine_id: i64,
    /// Distinct calendar days with at least one session
    pub total_sessions: u32,
    /// Longest run of consecutive calendar days with a session
    pub longest_streak: u32,
}
