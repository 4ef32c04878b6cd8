// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MinerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Connection failed to endpoint: {0}")]
    Connection(String),

    #[error("Submission failed: {hash:?}, reason: {reason}")]
    Submission { hash: String, reason: String },

    #[error("Confirmation timed out after {waited_ms} ms for {hash}")]
    ConfirmationTimeout { hash: String, waited_ms: u64 },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Validation failed for field {field}: {message}")]
    Validation { field: String, message: String },

    #[error("External API error: {provider} responded with {status}")]
    ApiCall { provider: String, status: u16 },

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl From<config::ConfigError> for MinerError {
    fn from(err: config::ConfigError) -> Self {
        MinerError::Config(err.to_string())
    }
}

impl From<sqlx::Error> for MinerError {
    fn from(err: sqlx::Error) -> Self {
        MinerError::Persistence(err.to_string())
    }
}
