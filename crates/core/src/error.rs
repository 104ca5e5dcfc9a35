//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants). Storage concerns belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. blank name, negative threshold).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A stock change of zero was requested.
    #[error("delta cannot be zero")]
    ZeroDelta,

    /// Applying the delta would drive stock below zero.
    #[error("insufficient stock: {on_hand} on hand, delta {delta}")]
    InsufficientStock { on_hand: i64, delta: i64 },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn insufficient_stock(on_hand: i64, delta: i64) -> Self {
        Self::InsufficientStock { on_hand, delta }
    }
}
