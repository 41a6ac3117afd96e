//! Metrics for the reconciliation pipeline and adherence analytics.
//!
//! Values are recorded through the `metrics` facade; the host decides which
//! recorder (if any) is installed.

use std::fmt;

/// All metric names recorded by the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Reconciliation
    PipelineRuns,
    PipelineFailures,
    PipelineDuration,
    RosterRows,
    EnrollmentRows,
    DuplicatesDropped,
    JoinedRows,
    RacesImputed,
    UnknownRaces,
    DefaultNames,
    PatientsPersisted,

    // Analytics
    AdherenceQueries,
    SessionEventsScanned,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::PipelineRuns => "kupuna_pipeline_runs_total",
            MetricName::PipelineFailures => "kupuna_pipeline_failures_total",
            MetricName::PipelineDuration => "kupuna_pipeline_duration_seconds",
            MetricName::RosterRows => "kupuna_roster_rows_total",
            MetricName::EnrollmentRows => "kupuna_enrollment_rows_total",
            MetricName::DuplicatesDropped => "kupuna_duplicates_dropped_total",
            MetricName::JoinedRows => "kupuna_joined_rows_total",
            MetricName::RacesImputed => "kupuna_races_imputed_total",
            MetricName::UnknownRaces => "kupuna_unknown_races_total",
            MetricName::DefaultNames => "kupuna_default_names_total",
            MetricName::PatientsPersisted => "kupuna_patients_persisted_total",
            MetricName::AdherenceQueries => "kupuna_adherence_queries_total",
            MetricName::SessionEventsScanned => "kupuna_session_events_scanned_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn emit_counter(name: MetricName, value: u64) {
    ::metrics::counter!(name.as_str()).increment(value);
}

pub fn emit_histogram(name: MetricName, value: f64) {
    ::metrics::histogram!(name.as_str()).record(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed_and_suffixed() {
        let names = [
            MetricName::PipelineRuns,
            MetricName::PipelineDuration,
            MetricName::DuplicatesDropped,
            MetricName::AdherenceQueries,
        ];
        for name in names {
            let s = name.to_string();
            assert!(s.starts_with("kupuna_"));
            assert!(s.ends_with("_total") || s.ends_with("_seconds"));
        }
    }

    #[test]
    fn test_emit_without_recorder_is_noop() {
        emit_counter(MetricName::PipelineRuns, 1);
        emit_histogram(MetricName::PipelineDuration, 0.5);
    }
}
