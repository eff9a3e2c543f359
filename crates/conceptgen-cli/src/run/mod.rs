mod logging;
mod report;

pub use logging::init_logging;
pub use report::{RunContext, RunReport, write_report};

use thiserror::Error;

/// Errors raised while writing run artifacts.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(String),
}

/// Result type for run artifact operations.
pub type RunResult<T> = std::result::Result<T, RunError>;
