//! Error types for the client binary.

use crate::config::ConfigError;
use fithero_core::ApiError;
use fithero_sync::MutationError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid auth token: {0}")]
    InvalidToken(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
