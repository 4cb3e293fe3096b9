//! # AppError
//!
//! Centralized error handling for the Villa Manager ecosystem.
//! Maps store and session failures to the four outcomes callers act on.

use thiserror::Error;

/// The primary error type for all villa operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// The operation needs a signed-in session and none is present.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Required field missing, or not coercible to its number/enum type.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Resource not found (entity name, id)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Any transport, query or configuration failure from the backend side.
    #[error("store error: {0:#}")]
    StoreError(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn villa_not_found(id: impl ToString) -> Self {
        Self::NotFound("villa".to_string(), id.to_string())
    }
}

/// Why a sign-in attempt failed. Never retried by this layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignInError {
    #[error("invalid login credentials")]
    InvalidCredentials,

    #[error("network failure: {0}")]
    Network(String),

    #[error("authentication service unavailable: {0}")]
    Unavailable(String),
}

impl From<SignInError> for AppError {
    fn from(err: SignInError) -> Self {
        match err {
            SignInError::InvalidCredentials => AppError::Unauthenticated(err.to_string()),
            other => AppError::StoreError(anyhow::Error::new(other)),
        }
    }
}

/// A specialized Result type for Villa Manager logic.
pub type Result<T> = std::result::Result<T, AppError>;
