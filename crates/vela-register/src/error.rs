//! # Register Error Types
//!
//! Error types for the register-side runtime.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Register Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │      Storage            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Transport      │  │  Database               │ │
//! │  │  ConfigLoad/    │  │  ServerStatus   │  │  Serialization          │ │
//! │  │  ConfigSave     │  │  SyncInProgress │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Transport failures are fully recoverable: the sale stays unsynced     │
//! │  and the next scheduler trigger retries it.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for register operations.
pub type RegisterResult<T> = Result<T, RegisterError>;

/// Register error type covering queue, connectivity and sync failures.
#[derive(Debug, Error)]
pub enum RegisterError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid register configuration.
    #[error("Invalid register configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// HTTP transport failed (connection refused, DNS, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered, but not with a usable response.
    #[error("Server returned status {status}")]
    ServerStatus { status: u16 },

    /// A sync attempt was already in flight; this one was a no-op.
    ///
    /// Not a failure: the non-reentrancy rule says a trigger received while
    /// syncing is dropped, and the next natural trigger picks up whatever is
    /// still pending.
    #[error("A sync is already in progress")]
    SyncInProgress,

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Queue payload (de)serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// The draft failed validation before it was persisted.
    #[error("Invalid sale: {0}")]
    InvalidSale(#[from] vela_core::ValidationError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<sqlx::Error> for RegisterError {
    fn from(err: sqlx::Error) -> Self {
        RegisterError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for RegisterError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        RegisterError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RegisterError {
    fn from(err: serde_json::Error) -> Self {
        RegisterError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for RegisterError {
    fn from(err: reqwest::Error) -> Self {
        RegisterError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for RegisterError {
    fn from(err: std::io::Error) -> Self {
        RegisterError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for RegisterError {
    fn from(err: toml::de::Error) -> Self {
        RegisterError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for RegisterError {
    fn from(err: toml::ser::Error) -> Self {
        RegisterError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl RegisterError {
    /// Returns true if the operation can simply be retried on the next
    /// scheduler trigger.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegisterError::Transport(_)
                | RegisterError::ServerStatus { .. }
                | RegisterError::SyncInProgress
        )
    }
}
