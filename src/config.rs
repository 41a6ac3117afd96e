use crate::error::{IntakeError, Result};
use crate::pipeline::impute::{ImputationPolicy, ImputationScope};
use crate::pipeline::join::JoinPolicy;
use crate::reference::ReferenceTables;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_PATH_ENV: &str = "KUPUNA_CONFIG";
pub const DB_PATH_ENV: &str = "KUPUNA_DB_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    /// Replacement reference tables; the built-in ones are used when absent
    pub reference: Option<ReferenceTables>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/kupuna.db"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub join_policy: JoinPolicy,
    pub imputation_policy: ImputationPolicy,
    pub imputation_scope: ImputationScope,
    /// Fixed seed for reproducible imputation; random when unset
    pub seed: Option<u64>,
}

impl Config {
    /// Load from `$KUPUNA_CONFIG` or `config.toml`, falling back to defaults
    /// when the file does not exist. `$KUPUNA_DB_PATH` overrides the database path.
    pub fn load() -> Result<Self> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            info!("No config file at {}, using defaults", path);
            Self::default()
        };

        if let Ok(db_path) = env::var(DB_PATH_ENV) {
            if !db_path.trim().is_empty() {
                config.storage.database_path = PathBuf::from(db_path);
            }
        }
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            IntakeError::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if let Some(reference) = &config.reference {
            reference.validate()?;
        }
        Ok(config)
    }

    /// Reference tables in effect
    pub fn reference_tables(&self) -> ReferenceTables {
        self.reference.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(config.pipeline.join_policy, JoinPolicy::SingleKey);
        assert_eq!(config.pipeline.imputation_scope, ImputationScope::PerKey);
        assert_eq!(config.storage.database_path, PathBuf::from("data/kupuna.db"));
        assert_eq!(config.reference_tables(), ReferenceTables::default());
    }

    #[test]
    fn test_pipeline_section() {
        let config = Config::from_toml(
            r#"
            [storage]
            database_path = "/tmp/k.db"

            [pipeline]
            join_policy = "two-stage"
            imputation_policy = "always-reroll"
            imputation_scope = "per-row"
            seed = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.join_policy, JoinPolicy::TwoStage);
        assert_eq!(config.pipeline.imputation_policy, ImputationPolicy::AlwaysReroll);
        assert_eq!(config.pipeline.imputation_scope, ImputationScope::PerRow);
        assert_eq!(config.pipeline.seed, Some(42));
        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/k.db"));
    }

    #[test]
    fn test_reference_override_is_validated() {
        let bad = r#"
            [reference]
            race_categories = ["Korean"]
            name_pools = []
            [reference.ethnicity_by_race]
            Japanese = 3
        "#;
        assert!(matches!(Config::from_toml(bad), Err(IntakeError::Config(_))));

        let good = r#"
            [reference]
            race_categories = ["Korean"]
            default_name = "Sam Kim"
            [reference.ethnicity_by_race]
            Korean = 3
            [[reference.name_pools]]
            race = "Korean"
            gender = "F"
            names = ["Ji-woo Park"]
        "#;
        let tables = Config::from_toml(good).unwrap().reference_tables();
        assert_eq!(tables.default_name, "Sam Kim");
        assert_eq!(tables.ethnicity_for("Korean"), 3);
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let result = Config::from_toml("[pipeline]\njoin_policy = \"sideways\"\n");
        assert!(matches!(result, Err(IntakeError::Toml(_))));
    }
}
