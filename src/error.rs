use thiserror::Error;

/// Errors crossing the configuration / file boundary.
///
/// Sensor dropouts and plausibility faults are not errors; they surface as
/// `TrackerEvent`s from the fusion core.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Session log error: {0}")]
    SessionLog(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
