pub mod analytics;
pub mod config;
pub mod constants;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod reference;
pub mod storage;
pub mod types;

pub use error::{IntakeError, Result};
