//! Shared error types for the services crate.

use thiserror::Error;

use pagemark_core::model::IdError;
use pagemark_core::session::DocumentSessionError;
use pagemark_core::settings::SettingsError;
use storage::repository::StorageError;

/// Errors emitted by progress gateways.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("document not found")]
    NotFound,
    #[error("progress request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => GatewayError::NotFound,
            other => GatewayError::Storage(other),
        }
    }
}

/// Errors emitted by `ReadingSession`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    Document(#[from] DocumentSessionError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{var} is required when {requires} is set")]
    Missing {
        var: &'static str,
        requires: &'static str,
    },
    #[error("invalid value for {var}: {raw:?}")]
    Invalid { var: &'static str, raw: String },
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
