use crate::domain::*;
use crate::error::{IntakeError, Result};
use crate::storage::Storage;
use crate::types::ReconciledPatient;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;
CREATE TABLE IF NOT EXISTS exercises (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    phase       TEXT NOT NULL,
    description TEXT NOT NULL,
    video       TEXT
);
CREATE TABLE IF NOT EXISTS routines (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  TEXT NOT NULL,
    music TEXT
);
CREATE TABLE IF NOT EXISTS routine_exercises (
    routine_id  INTEGER NOT NULL REFERENCES routines(id),
    exercise_id INTEGER NOT NULL REFERENCES exercises(id),
    position    INTEGER NOT NULL,
    PRIMARY KEY (routine_id, position)
);
CREATE TABLE IF NOT EXISTS patients (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    person_key TEXT NOT NULL,
    name       TEXT NOT NULL,
    age        INTEGER,
    gender     TEXT,
    race       TEXT NOT NULL,
    ethnicity  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS patient_routines (
    patient_id INTEGER NOT NULL REFERENCES patients(id),
    routine_id INTEGER NOT NULL REFERENCES routines(id),
    PRIMARY KEY (patient_id, routine_id)
);
CREATE TABLE IF NOT EXISTS session_events (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id   INTEGER NOT NULL REFERENCES patients(id),
    routine_id   INTEGER NOT NULL REFERENCES routines(id),
    completed_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_session_events_pair ON session_events (patient_id, routine_id);
"#;

/// SQLite-backed storage
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database file and apply the schema
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        info!("Opened database at {}", path.as_ref().display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| IntakeError::Storage {
            message: "database connection lock poisoned".to_string(),
        })
    }

    fn exists(conn: &Connection, table: &str, id: i64) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {table} WHERE id = ?1");
        let found: Option<i64> = conn.query_row(&sql, params![id], |row| row.get(0)).optional()?;
        Ok(found.is_some())
    }

    fn require(conn: &Connection, table: &str, entity: &'static str, id: i64) -> Result<()> {
        if Self::exists(conn, table, id)? {
            Ok(())
        } else {
            Err(IntakeError::NotFound { entity, id })
        }
    }
}

fn exercise_from_row(row: &Row<'_>) -> rusqlite::Result<Exercise> {
    Ok(Exercise {
        id: row.get(0)?,
        name: row.get(1)?,
        phase: row.get(2)?,
        description: row.get(3)?,
        video: row.get(4)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| IntakeError::Storage {
            message: format!("bad completed_at '{raw}': {e}"),
        })
}

impl Storage for SqliteStorage {
    fn insert_exercise(&self, exercise: &NewExercise) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO exercises (name, phase, description, video) VALUES (?1, ?2, ?3, ?4)",
            params![exercise.name, exercise.phase, exercise.description, exercise.video],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn fetch_all_exercises(&self) -> Result<Vec<Exercise>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, phase, description, video FROM exercises ORDER BY id")?;
        let rows = stmt.query_map([], exercise_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_routine(&self, name: &str, music: Option<&str>, exercise_ids: &[i64]) -> Result<i64> {
        let mut conn = self.conn()?;
        for id in exercise_ids {
            Self::require(&conn, "exercises", "exercise", *id)?;
        }
        let tx = conn.transaction()?;
        tx.execute("INSERT INTO routines (name, music) VALUES (?1, ?2)", params![name, music])?;
        let routine_id = tx.last_insert_rowid();
        for (position, exercise_id) in exercise_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO routine_exercises (routine_id, exercise_id, position) VALUES (?1, ?2, ?3)",
                params![routine_id, exercise_id, position as i64],
            )?;
        }
        tx.commit()?;
        info!("Created routine {} with {} exercises", name, exercise_ids.len());
        Ok(routine_id)
    }

    fn fetch_routines(&self) -> Result<Vec<Routine>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, music FROM routines ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Routine {
                id: row.get(0)?,
                name: row.get(1)?,
                music: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn fetch_routine_exercises(&self, routine_id: i64) -> Result<Vec<Exercise>> {
        let conn = self.conn()?;
        Self::require(&conn, "routines", "routine", routine_id)?;
        let mut stmt = conn.prepare(
            "SELECT e.id, e.name, e.phase, e.description, e.video
             FROM routine_exercises re JOIN exercises e ON e.id = re.exercise_id
             WHERE re.routine_id = ?1 ORDER BY re.position",
        )?;
        let rows = stmt.query_map(params![routine_id], exercise_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn bulk_insert_patients(&self, patients: &[ReconciledPatient]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO patients (person_key, name, age, gender, race, ethnicity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for p in patients {
                stmt.execute(params![p.person_key, p.name, p.age, p.gender, p.race, p.ethnicity])?;
            }
        }
        tx.commit()?;
        info!("Inserted {} patients", patients.len());
        Ok(patients.len())
    }

    fn fetch_patients(&self) -> Result<Vec<Patient>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, person_key, name, age, gender, race, ethnicity FROM patients ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Patient {
                id: row.get(0)?,
                person_key: row.get(1)?,
                name: row.get(2)?,
                age: row.get(3)?,
                gender: row.get(4)?,
                race: row.get(5)?,
                ethnicity: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn assign_routine(&self, patient_id: i64, routine_id: i64) -> Result<()> {
        let conn = self.conn()?;
        Self::require(&conn, "patients", "patient", patient_id)?;
        Self::require(&conn, "routines", "routine", routine_id)?;
        conn.execute(
            "INSERT OR IGNORE INTO patient_routines (patient_id, routine_id) VALUES (?1, ?2)",
            params![patient_id, routine_id],
        )?;
        Ok(())
    }

    fn fetch_patient_routines(&self) -> Result<Vec<PatientRoutine>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.name, r.id, r.name
             FROM patient_routines pr
             JOIN patients p ON p.id = pr.patient_id
             JOIN routines r ON r.id = pr.routine_id
             ORDER BY p.id, r.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PatientRoutine {
                patient_id: row.get(0)?,
                patient_name: row.get(1)?,
                routine_id: row.get(2)?,
                routine_name: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_session_event(&self, event: &SessionEvent) -> Result<()> {
        let conn = self.conn()?;
        Self::require(&conn, "patients", "patient", event.patient_id)?;
        Self::require(&conn, "routines", "routine", event.routine_id)?;
        conn.execute(
            "INSERT INTO session_events (patient_id, routine_id, completed_at) VALUES (?1, ?2, ?3)",
            params![event.patient_id, event.routine_id, event.completed_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn fetch_session_events(&self, patient_id: i64, routine_id: i64) -> Result<Vec<SessionEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT completed_at FROM session_events WHERE patient_id = ?1 AND routine_id = ?2",
        )?;
        let raw: Vec<String> = stmt
            .query_map(params![patient_id, routine_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut events = raw
            .iter()
            .map(|ts| {
                Ok(SessionEvent {
                    patient_id,
                    routine_id,
                    completed_at: parse_timestamp(ts)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        events.sort_by_key(|e| e.completed_at);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn patient(key: &str, age: Option<u32>) -> ReconciledPatient {
        ReconciledPatient {
            person_key: key.to_string(),
            name: "Jose Rizal".to_string(),
            age,
            gender: Some("M".to_string()),
            race: "Filipino".to_string(),
            ethnicity: 1,
        }
    }

    #[test]
    fn test_patients_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("kupuna.db");
        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.bulk_insert_patients(&[patient("A", Some(80)), patient("B", None)]).unwrap();
        }
        let reopened = SqliteStorage::open(&path).unwrap();
        let patients = reopened.fetch_patients().unwrap();
        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0].person_key, "A");
        assert_eq!(patients[0].age, Some(80));
        assert_eq!(patients[1].age, None);
        assert_eq!(patients[1].race, "Filipino");
    }

    #[test]
    fn test_routine_exercises_in_position_order() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let new = |name: &str| NewExercise {
            name: name.to_string(),
            phase: "main".to_string(),
            description: String::new(),
            video: Some("https://example.org/v.mp4".to_string()),
        };
        let a = storage.insert_exercise(&new("Toe taps")).unwrap();
        let b = storage.insert_exercise(&new("Chair stands")).unwrap();
        let routine = storage.insert_routine("Strength", None, &[b, a]).unwrap();

        let exercises = storage.fetch_routine_exercises(routine).unwrap();
        assert_eq!(exercises[0].name, "Chair stands");
        assert_eq!(exercises[1].video.as_deref(), Some("https://example.org/v.mp4"));
        assert_eq!(storage.fetch_routines().unwrap()[0].music, None);
        assert_eq!(storage.fetch_all_exercises().unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_routine_is_not_found() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert!(matches!(
            storage.fetch_routine_exercises(7),
            Err(IntakeError::NotFound { entity: "routine", id: 7 })
        ));
    }

    #[test]
    fn test_sessions_and_assignments() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.bulk_insert_patients(&[patient("A", Some(70))]).unwrap();
        let pid = storage.fetch_patients().unwrap()[0].id;
        let rid = storage.insert_routine("Balance", Some("Slack key"), &[]).unwrap();
        storage.assign_routine(pid, rid).unwrap();
        storage.assign_routine(pid, rid).unwrap();

        let assigned = storage.fetch_patient_routines().unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].routine_name, "Balance");

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        storage
            .insert_session_event(&SessionEvent { patient_id: pid, routine_id: rid, completed_at: at })
            .unwrap();
        let events = storage.fetch_session_events(pid, rid).unwrap();
        assert_eq!(events, vec![SessionEvent { patient_id: pid, routine_id: rid, completed_at: at }]);
        assert!(storage.fetch_session_events(pid, rid + 1).unwrap().is_empty());
    }
}
