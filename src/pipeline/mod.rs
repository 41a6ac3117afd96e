// Member reconciliation: parse, deduplicate, join, impute, name, project

pub mod dedup;
pub mod impute;
pub mod join;
pub mod names;
pub mod parser;
pub mod project;
pub mod reconcile;

// Re-export the entry points used by the CLI and integration tests
pub use join::JoinPolicy;
pub use parser::{parse_table, write_table, FieldValue, Record, Table};
pub use reconcile::{PipelineResult, ReconciliationPipeline};
