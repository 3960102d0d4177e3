use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WeighError {
    /// No sample landed inside the freshness window.
    #[error("scale did not provide fresh data")]
    NotReady,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("transport timeout")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("calibration error: {0}")]
    Calibration(String),
    #[error("invalid state: {0}")]
    State(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
