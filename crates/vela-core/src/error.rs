//! # Error Types
//!
//! Domain-specific error types for vela-core.
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (code, id, amounts)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a per-item sync outcome or a user-facing
//!    rejection

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These represent business rule violations raised by the settlement engine.
/// On the bulk sync path they become per-item `error` results; on the online
/// checkout path they reject the sale before commit.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found on the server of record.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Insufficient stock to complete a sale.
    ///
    /// Raised only on the synchronous checkout path. The offline-replay path
    /// deliberately skips this check: a sale already rung up at the register
    /// cannot be rejected retroactively, and stock may go negative.
    #[error("Insufficient stock for {code}: available {available}, requested {requested}")]
    InsufficientStock {
        code: String,
        available: i64,
        requested: i64,
    },

    /// Customer referenced by the sale does not exist.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Payment amount is invalid (negative, or exceeds what the sale allows).
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when a sale payload doesn't meet requirements. Used for early
/// validation before any settlement effect runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// A collection that must contain at least one element is empty.
    #[error("{field} must not be empty")]
    Empty { field: String },

    /// Arithmetic on the payload overflowed.
    #[error("{field} overflows the money range")]
    Overflow { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            code: "RB-1KG".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for RB-1KG: available 3, requested 5"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Empty {
            field: "items".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
