//! Unified error handling for the trip-planner library.
//!
//! This module provides a consistent error type for all trip-planner
//! operations, covering store failures, validation, parsing, and the
//! session bootstrap path.

use std::fmt;

/// Unified error type for trip-planner operations.
#[derive(Debug, Clone)]
pub enum TripPlanError {
    /// Store or auth setup failed; the caller stays in the connecting state
    Initialization { message: String },
    /// A required field was missing or malformed; no write was attempted
    Validation { message: String },
    /// A JSON payload (import file, document body) could not be parsed
    Parse { message: String },
    /// A document required by the operation does not exist
    NotFound { path: String },
    /// A batch precondition was not met; no write was applied
    PreconditionFailed { message: String },
    /// A path is not a valid document or collection path
    InvalidPath { path: String, message: String },
    /// Storage backend error
    Store { message: String },
    /// HTTP/API error
    Http {
        message: String,
        status_code: Option<u16>,
    },
}

impl fmt::Display for TripPlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripPlanError::Initialization { message } => {
                write!(f, "Initialization failed: {}", message)
            }
            TripPlanError::Validation { message } => {
                write!(f, "Validation failed: {}", message)
            }
            TripPlanError::Parse { message } => {
                write!(f, "Parse error: {}", message)
            }
            TripPlanError::NotFound { path } => {
                write!(f, "Document '{}' not found", path)
            }
            TripPlanError::PreconditionFailed { message } => {
                write!(f, "Precondition failed: {}", message)
            }
            TripPlanError::InvalidPath { path, message } => {
                write!(f, "Invalid path '{}': {}", path, message)
            }
            TripPlanError::Store { message } => {
                write!(f, "Store error: {}", message)
            }
            TripPlanError::Http {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "HTTP error ({}): {}", code, message)
                } else {
                    write!(f, "HTTP error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for TripPlanError {}

/// Result type alias for trip-planner operations.
pub type Result<T> = std::result::Result<T, TripPlanError>;

/// Extension trait for converting Option to TripPlanError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a not-found error.
    fn ok_or_not_found(self, path: &str) -> Result<T>;

    /// Convert Option to Result with a validation error.
    fn ok_or_validation(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, path: &str) -> Result<T> {
        self.ok_or_else(|| TripPlanError::NotFound {
            path: path.to_string(),
        })
    }

    fn ok_or_validation(self, message: &str) -> Result<T> {
        self.ok_or_else(|| TripPlanError::Validation {
            message: message.to_string(),
        })
    }
}
