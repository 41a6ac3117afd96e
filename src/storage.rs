use crate::domain::*;
use crate::error::{IntakeError, Result};
use crate::types::ReconciledPatient;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Storage façade for patients, routines and the session log.
///
/// Calls are blocking. Failures are returned to the caller unchanged; nothing
/// here retries.
pub trait Storage: Send + Sync {
    // Exercise and routine operations
    fn insert_exercise(&self, exercise: &NewExercise) -> Result<i64>;
    fn fetch_all_exercises(&self) -> Result<Vec<Exercise>>;
    /// Create a routine from existing exercises, kept in the given order
    fn insert_routine(&self, name: &str, music: Option<&str>, exercise_ids: &[i64]) -> Result<i64>;
    fn fetch_routines(&self) -> Result<Vec<Routine>>;
    fn fetch_routine_exercises(&self, routine_id: i64) -> Result<Vec<Exercise>>;

    // Patient operations
    /// Insert every patient as a new row. There is no upsert: inserting the
    /// same identity key twice stores two patients.
    fn bulk_insert_patients(&self, patients: &[ReconciledPatient]) -> Result<usize>;
    fn fetch_patients(&self) -> Result<Vec<Patient>>;

    // Assignment operations
    fn assign_routine(&self, patient_id: i64, routine_id: i64) -> Result<()>;
    fn fetch_patient_routines(&self) -> Result<Vec<PatientRoutine>>;

    // Session log operations
    fn insert_session_event(&self, event: &SessionEvent) -> Result<()>;
    fn fetch_session_events(&self, patient_id: i64, routine_id: i64) -> Result<Vec<SessionEvent>>;
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    exercises: BTreeMap<i64, Exercise>,
    routines: BTreeMap<i64, Routine>,
    routine_exercises: BTreeMap<i64, Vec<i64>>,
    patients: BTreeMap<i64, Patient>,
    assignments: Vec<(i64, i64)>,
    sessions: Vec<SessionEvent>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory storage implementation for development/testing
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| IntakeError::Storage {
            message: "in-memory storage lock poisoned".to_string(),
        })
    }
}

impl Storage for InMemoryStorage {
    fn insert_exercise(&self, exercise: &NewExercise) -> Result<i64> {
        let mut tables = self.lock()?;
        let id = tables.allocate_id();
        tables.exercises.insert(
            id,
            Exercise {
                id,
                name: exercise.name.clone(),
                phase: exercise.phase.clone(),
                description: exercise.description.clone(),
                video: exercise.video.clone(),
            },
        );
        debug!("Created exercise: {} with id {}", exercise.name, id);
        Ok(id)
    }

    fn fetch_all_exercises(&self) -> Result<Vec<Exercise>> {
        Ok(self.lock()?.exercises.values().cloned().collect())
    }

    fn insert_routine(&self, name: &str, music: Option<&str>, exercise_ids: &[i64]) -> Result<i64> {
        let mut tables = self.lock()?;
        if let Some(missing) = exercise_ids.iter().find(|id| !tables.exercises.contains_key(*id)) {
            return Err(IntakeError::NotFound { entity: "exercise", id: *missing });
        }
        let id = tables.allocate_id();
        tables.routines.insert(
            id,
            Routine {
                id,
                name: name.to_string(),
                music: music.map(str::to_string),
            },
        );
        tables.routine_exercises.insert(id, exercise_ids.to_vec());
        debug!("Created routine: {} with id {}", name, id);
        Ok(id)
    }

    fn fetch_routines(&self) -> Result<Vec<Routine>> {
        Ok(self.lock()?.routines.values().cloned().collect())
    }

    fn fetch_routine_exercises(&self, routine_id: i64) -> Result<Vec<Exercise>> {
        let tables = self.lock()?;
        let ids = tables
            .routine_exercises
            .get(&routine_id)
            .ok_or(IntakeError::NotFound { entity: "routine", id: routine_id })?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.exercises.get(id).cloned())
            .collect())
    }

    fn bulk_insert_patients(&self, patients: &[ReconciledPatient]) -> Result<usize> {
        let mut tables = self.lock()?;
        for p in patients {
            let id = tables.allocate_id();
            tables.patients.insert(
                id,
                Patient {
                    id,
                    person_key: p.person_key.clone(),
                    name: p.name.clone(),
                    age: p.age,
                    gender: p.gender.clone(),
                    race: p.race.clone(),
                    ethnicity: p.ethnicity,
                },
            );
        }
        debug!("Inserted {} patients", patients.len());
        Ok(patients.len())
    }

    fn fetch_patients(&self) -> Result<Vec<Patient>> {
        Ok(self.lock()?.patients.values().cloned().collect())
    }

    fn assign_routine(&self, patient_id: i64, routine_id: i64) -> Result<()> {
        let mut tables = self.lock()?;
        if !tables.patients.contains_key(&patient_id) {
            return Err(IntakeError::NotFound { entity: "patient", id: patient_id });
        }
        if !tables.routines.contains_key(&routine_id) {
            return Err(IntakeError::NotFound { entity: "routine", id: routine_id });
        }
        if !tables.assignments.contains(&(patient_id, routine_id)) {
            tables.assignments.push((patient_id, routine_id));
        }
        Ok(())
    }

    fn fetch_patient_routines(&self) -> Result<Vec<PatientRoutine>> {
        let tables = self.lock()?;
        let mut out: Vec<PatientRoutine> = tables
            .assignments
            .iter()
            .filter_map(|(pid, rid)| {
                let patient = tables.patients.get(pid)?;
                let routine = tables.routines.get(rid)?;
                Some(PatientRoutine {
                    patient_id: *pid,
                    patient_name: patient.name.clone(),
                    routine_id: *rid,
                    routine_name: routine.name.clone(),
                })
            })
            .collect();
        out.sort_by_key(|pr| (pr.patient_id, pr.routine_id));
        Ok(out)
    }

    fn insert_session_event(&self, event: &SessionEvent) -> Result<()> {
        let mut tables = self.lock()?;
        if !tables.patients.contains_key(&event.patient_id) {
            return Err(IntakeError::NotFound { entity: "patient", id: event.patient_id });
        }
        if !tables.routines.contains_key(&event.routine_id) {
            return Err(IntakeError::NotFound { entity: "routine", id: event.routine_id });
        }
        tables.sessions.push(event.clone());
        Ok(())
    }

    fn fetch_session_events(&self, patient_id: i64, routine_id: i64) -> Result<Vec<SessionEvent>> {
        let tables = self.lock()?;
        let mut events: Vec<SessionEvent> = tables
            .sessions
            .iter()
            .filter(|e| e.patient_id == patient_id && e.routine_id == routine_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.completed_at);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn patient(key: &str) -> ReconciledPatient {
        ReconciledPatient {
            person_key: key.to_string(),
            name: "Mary Sato".to_string(),
            age: Some(85),
            gender: Some("F".to_string()),
            race: "Japanese".to_string(),
            ethnicity: 3,
        }
    }

    fn exercise(name: &str) -> NewExercise {
        NewExercise {
            name: name.to_string(),
            phase: "warm-up".to_string(),
            description: "Slow and steady".to_string(),
            video: None,
        }
    }

    #[test]
    fn test_bulk_insert_has_no_upsert() {
        let storage = InMemoryStorage::new();
        storage.bulk_insert_patients(&[patient("A")]).unwrap();
        storage.bulk_insert_patients(&[patient("A")]).unwrap();
        let patients = storage.fetch_patients().unwrap();
        assert_eq!(patients.len(), 2);
        assert_ne!(patients[0].id, patients[1].id);
    }

    #[test]
    fn test_routine_keeps_exercise_order() {
        let storage = InMemoryStorage::new();
        let a = storage.insert_exercise(&exercise("Arm circles")).unwrap();
        let b = storage.insert_exercise(&exercise("Seated march")).unwrap();
        let routine = storage.insert_routine("Morning", Some("Hula"), &[b, a]).unwrap();

        let names: Vec<String> = storage
            .fetch_routine_exercises(routine)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Seated march", "Arm circles"]);
    }

    #[test]
    fn test_routine_with_unknown_exercise_fails() {
        let storage = InMemoryStorage::new();
        let err = storage.insert_routine("Broken", None, &[42]).unwrap_err();
        assert!(matches!(err, IntakeError::NotFound { entity: "exercise", id: 42 }));
    }

    #[test]
    fn test_assignment_and_sessions() {
        let storage = InMemoryStorage::new();
        storage.bulk_insert_patients(&[patient("A")]).unwrap();
        let pid = storage.fetch_patients().unwrap()[0].id;
        let rid = storage.insert_routine("Evening", None, &[]).unwrap();

        storage.assign_routine(pid, rid).unwrap();
        storage.assign_routine(pid, rid).unwrap();
        let assigned = storage.fetch_patient_routines().unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].patient_name, "Mary Sato");
        assert_eq!(assigned[0].routine_name, "Evening");

        let later = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        for at in [later, earlier] {
            storage
                .insert_session_event(&SessionEvent { patient_id: pid, routine_id: rid, completed_at: at })
                .unwrap();
        }
        let events = storage.fetch_session_events(pid, rid).unwrap();
        assert_eq!(events[0].completed_at, earlier);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_assign_unknown_patient_fails() {
        let storage = InMemoryStorage::new();
        let rid = storage.insert_routine("Evening", None, &[]).unwrap();
        assert!(matches!(
            storage.assign_routine(999, rid),
            Err(IntakeError::NotFound { entity: "patient", .. })
        ));
    }
}
