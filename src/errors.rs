use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilingError {
    #[error("STORE_FAILURE: {0}")]
    Store(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for FilingError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for FilingError {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<serde_yaml::Error> for FilingError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<anyhow::Error> for FilingError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type FilingResult<T> = Result<T, FilingError>;
