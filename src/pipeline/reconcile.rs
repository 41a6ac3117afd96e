use crate::config::PipelineConfig;
use crate::error::Result;
use crate::metrics::{emit_counter, emit_histogram, MetricName};
use crate::pipeline::dedup::dedup_roster;
use crate::pipeline::impute::{DemographicImputer, ImputationOutcome};
use crate::pipeline::join::join;
use crate::pipeline::names::assign_names;
use crate::pipeline::parser::parse_table;
use crate::pipeline::project::project;
use crate::reference::ReferenceTables;
use crate::storage::Storage;
use crate::types::{
    EnrollmentRecord, ReconciledPatient, RosterRecord, ENROLLMENT_REQUIRED_COLUMNS,
    ROSTER_REQUIRED_COLUMNS,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// Result of one reconciliation run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub roster_rows: usize,
    pub enrollment_rows: usize,
    pub duplicates_dropped: usize,
    pub joined_rows: usize,
    pub imputation: ImputationOutcome,
    pub default_names: usize,
    pub persisted: usize,
    pub patients: Vec<ReconciledPatient>,
}

/// Parse → deduplicate → join → impute → name → project, then optionally persist.
///
/// The full patient table is built before anything is written, so a failed
/// run never leaves a partial insert behind.
pub struct ReconciliationPipeline {
    tables: ReferenceTables,
    config: PipelineConfig,
}

impl ReconciliationPipeline {
    pub fn new(tables: ReferenceTables, config: PipelineConfig) -> Result<Self> {
        tables.validate()?;
        Ok(Self { tables, config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Random source for a run: seeded when the config has a seed
    pub fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Run the pipeline without touching storage
    pub fn run<R: Rng + ?Sized>(&self, roster_text: &str, enrollment_text: &str, rng: &mut R) -> Result<PipelineResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("reconcile", run_id = %run_id, join_policy = %self.config.join_policy);
        let _enter = span.enter();

        emit_counter(MetricName::PipelineRuns, 1);
        let started = Instant::now();
        let result = self.reconcile(run_id, roster_text, enrollment_text, rng);
        emit_histogram(MetricName::PipelineDuration, started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            error!("Reconciliation failed: {}", e);
            emit_counter(MetricName::PipelineFailures, 1);
        }
        result
    }

    /// Run the pipeline and hand the patient table to storage in one bulk insert
    pub fn run_and_persist<R: Rng + ?Sized>(
        &self,
        roster_text: &str,
        enrollment_text: &str,
        storage: &dyn Storage,
        rng: &mut R,
    ) -> Result<PipelineResult> {
        let mut result = self.run(roster_text, enrollment_text, rng)?;
        if result.patients.is_empty() {
            info!("No overlapping members, nothing to persist");
            return Ok(result);
        }
        result.persisted = storage.bulk_insert_patients(&result.patients)?;
        emit_counter(MetricName::PatientsPersisted, result.persisted as u64);
        info!("💾 Persisted {} patients", result.persisted);
        Ok(result)
    }

    fn reconcile<R: Rng + ?Sized>(
        &self,
        run_id: Uuid,
        roster_text: &str,
        enrollment_text: &str,
        rng: &mut R,
    ) -> Result<PipelineResult> {
        // Step 1: Parse both extracts
        let roster_table = parse_table(roster_text)?;
        roster_table.require_columns(&ROSTER_REQUIRED_COLUMNS)?;
        let enrollment_table = parse_table(enrollment_text)?;
        enrollment_table.require_columns(&ENROLLMENT_REQUIRED_COLUMNS)?;

        let roster: Vec<RosterRecord> = roster_table.typed()?;
        let enrollment: Vec<EnrollmentRecord> = enrollment_table.typed()?;
        info!("Parsed {} roster rows and {} enrollment rows", roster.len(), enrollment.len());
        emit_counter(MetricName::RosterRows, roster.len() as u64);
        emit_counter(MetricName::EnrollmentRows, enrollment.len() as u64);

        // Step 2: Deduplicate roster on (identity key, metro area)
        let roster_rows = roster.len();
        let roster = dedup_roster(roster);
        let duplicates_dropped = roster_rows - roster.len();
        if duplicates_dropped > 0 {
            info!("Dropped {} duplicate roster rows", duplicates_dropped);
        }
        emit_counter(MetricName::DuplicatesDropped, duplicates_dropped as u64);

        // Step 3: Join
        let mut rows = join(&roster, &enrollment, self.config.join_policy);
        emit_counter(MetricName::JoinedRows, rows.len() as u64);
        if rows.is_empty() {
            warn!("Join produced no rows; extracts share no identity keys");
        }

        // Step 4: Impute race and ethnicity
        let imputer = DemographicImputer::new(
            &self.tables,
            self.config.imputation_policy,
            self.config.imputation_scope,
        )?;
        let imputation = imputer.impute(&mut rows, rng);
        info!(
            "Imputed race for {} rows ({} observed, {} outside category set)",
            imputation.imputed, imputation.observed, imputation.unknown_races
        );
        emit_counter(MetricName::RacesImputed, imputation.imputed as u64);
        emit_counter(MetricName::UnknownRaces, imputation.unknown_races as u64);

        // Step 5: Synthesize names
        let default_names = assign_names(&mut rows, &self.tables, self.config.imputation_scope, rng);
        emit_counter(MetricName::DefaultNames, default_names as u64);

        // Step 6: Project onto patient columns
        let patients = project(&rows)?;
        info!("✅ Reconciled {} patient rows", patients.len());

        Ok(PipelineResult {
            run_id,
            roster_rows,
            enrollment_rows: enrollment.len(),
            duplicates_dropped,
            joined_rows: rows.len(),
            imputation,
            default_names,
            persisted: 0,
            patients,
        })
    }
}
