use thiserror::Error;

#[derive(Error, Debug)]
pub enum SamplingError {
    #[error("Invalid sampling ratio: {0} (must be within [0, 1])")]
    InvalidSamplingRatio(f64),

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid parameter format: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SamplingError>;
