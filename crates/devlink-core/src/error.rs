//! Error types for the shared data model.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Addressing errors
    #[error("Invalid device id: {0}")]
    InvalidDeviceId(String),

    #[error("Invalid native descriptor in {id}: {message}")]
    InvalidDescriptor { id: String, message: String },

    // Job errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<envy::Error> for Error {
    fn from(error: envy::Error) -> Self {
        Self::Config(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
