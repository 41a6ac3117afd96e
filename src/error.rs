use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Malformed input at line {line}: {message}")]
    MalformedInput { line: usize, message: String },

    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
}

impl IntakeError {
    pub fn malformed(line: usize, message: impl Into<String>) -> Self {
        IntakeError::MalformedInput {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IntakeError>;
