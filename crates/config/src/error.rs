use thiserror::Error;

/// Configuration parsing and validation errors.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("invalid value '{value}' for field '{field}'")]
    InvalidValue { field: String, value: String },

    #[error("required field '{field}' is missing")]
    MissingField { field: String },
}
