//! Unified application error types for Seatgate.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator. The [`ErrorKind`] taxonomy is what
//! callers branch on: contention is retryable, exhaustion is definitive,
//! and invalid transitions carry a typed [`TransitionRejection`].

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Unknown section or reservation, or a reservation owned by someone else.
    NotFound,
    /// Input validation failed (bad quantity, section not open, ...).
    Validation,
    /// A lock or claim could not be obtained within the retry budget.
    Contention,
    /// The section has fewer free units than requested.
    CapacityExhausted,
    /// A reservation state-machine precondition failed.
    InvalidTransition,
    /// An internal accounting invariant was broken.
    InvariantViolation,
    /// A database error occurred.
    Database,
    /// The coordination store failed or returned unexpected data.
    Coordination,
    /// A read-through cache error occurred.
    Cache,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An internal error occurred.
    Internal,
    /// The service is temporarily unavailable.
    ServiceUnavailable,
}

impl ErrorKind {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention | Self::ServiceUnavailable)
    }

    /// Advisory HTTP status for the outer API layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Validation => 400,
            Self::CapacityExhausted | Self::InvalidTransition => 409,
            Self::Contention | Self::ServiceUnavailable => 503,
            _ => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Contention => write!(f, "CONTENTION"),
            Self::CapacityExhausted => write!(f, "CAPACITY_EXHAUSTED"),
            Self::InvalidTransition => write!(f, "INVALID_TRANSITION"),
            Self::InvariantViolation => write!(f, "INVARIANT_VIOLATION"),
            Self::Database => write!(f, "DATABASE"),
            Self::Coordination => write!(f, "COORDINATION"),
            Self::Cache => write!(f, "CACHE"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Internal => write!(f, "INTERNAL"),
            Self::ServiceUnavailable => write!(f, "SERVICE_UNAVAILABLE"),
        }
    }
}

/// Why a reservation could not move to the requested state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TransitionRejection {
    /// The reservation was already confirmed.
    AlreadyConfirmed,
    /// The reservation was already cancelled.
    AlreadyCancelled,
    /// The hold deadline passed, or the reservation was already expired.
    Expired,
}

impl fmt::Display for TransitionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConfirmed => write!(f, "Reservation is already confirmed"),
            Self::AlreadyCancelled => write!(f, "Reservation is already cancelled"),
            Self::Expired => write!(f, "Reservation has expired"),
        }
    }
}

/// The unified application error used throughout Seatgate.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Typed reason, set only for [`ErrorKind::InvalidTransition`].
    pub rejection: Option<TransitionRejection>,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rejection: None,
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            rejection: None,
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a contention error (lock or claim retry budget exhausted).
    pub fn contention(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Contention, message)
    }

    /// Create a capacity-exhausted error.
    pub fn capacity_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CapacityExhausted, message)
    }

    /// Create an invalid-transition error with its typed reason.
    pub fn invalid_transition(rejection: TransitionRejection) -> Self {
        Self {
            kind: ErrorKind::InvalidTransition,
            message: rejection.to_string(),
            rejection: Some(rejection),
            source: None,
        }
    }

    /// Create an invariant-violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvariantViolation, message)
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// Create a coordination-store error.
    pub fn coordination(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Coordination, message)
    }

    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cache, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Create a service-unavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    /// Message suitable for showing to the person who made the request.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::Contention | ErrorKind::ServiceUnavailable => {
                "The system is busy, please try again".to_string()
            }
            ErrorKind::CapacityExhausted => "No seats available".to_string(),
            ErrorKind::InvalidTransition => self
                .rejection
                .map(|r| r.to_string())
                .unwrap_or_else(|| self.message.clone()),
            ErrorKind::NotFound => "Reservation not found".to_string(),
            ErrorKind::Validation => self.message.clone(),
            _ => "Internal error".to_string(),
        }
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            rejection: self.rejection,
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
