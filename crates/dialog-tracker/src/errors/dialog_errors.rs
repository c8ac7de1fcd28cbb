//! Dialog error definitions
//!
//! ## Error Categories
//!
//! - **Protocol**: a message is missing a header the tracker needs (Call-ID,
//!   From-tag, CSeq, Contact) or carries an unparsable route parameter.
//! - **Dialog**: lookup misses and operations attempted in the wrong state.
//! - **Collaborator**: failures reported by the transaction layer or the
//!   persistence backend.
//! - **Internal**: table invariants that should never break (double unlink).

use std::fmt;

use thiserror::Error;

use crate::dialog::DialogState;

/// Result type for dialog-tracker operations
pub type DialogResult<T> = Result<T, DialogError>;

/// Errors produced by the dialog tracker
#[derive(Debug, Clone, Error)]
pub enum DialogError {
    /// Message is missing something dialog tracking needs
    #[error("Protocol error: {message}")]
    ProtocolError { message: String },

    /// Route parameter could not be decoded
    #[error("Invalid route parameter '{value}': {reason}")]
    RouteParamError { value: String, reason: String },

    /// No dialog for the given identity
    #[error("Dialog not found: {id}")]
    DialogNotFound { id: String },

    /// Operation not allowed in the dialog's current state
    #[error("Invalid dialog state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: DialogState },

    /// Transaction layer rejected a registration or request
    #[error("Transaction error: {message}")]
    TransactionError { message: String },

    /// Persistence backend failed
    #[error("Persistence error: {message}")]
    PersistenceError { message: String },

    /// Configuration rejected by validation
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Unknown or undeclared dialog profile
    #[error("Profile error: {message}")]
    ProfileError { message: String },

    /// Table or reference invariant broken
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

/// Coarse classification used for logging and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Protocol,
    Dialog,
    Collaborator,
    Configuration,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Dialog => "dialog",
            ErrorCategory::Collaborator => "collaborator",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl DialogError {
    /// Create a protocol error
    pub fn protocol_error(message: &str) -> Self {
        Self::ProtocolError { message: message.to_string() }
    }

    /// Create a dialog-not-found error
    pub fn dialog_not_found(id: &str) -> Self {
        Self::DialogNotFound { id: id.to_string() }
    }

    /// Create a route parameter error
    pub fn route_param(value: &str, reason: impl Into<String>) -> Self {
        Self::RouteParamError { value: value.to_string(), reason: reason.into() }
    }

    /// Create an invalid state error
    pub fn invalid_state(expected: impl Into<String>, actual: DialogState) -> Self {
        Self::InvalidState { expected: expected.into(), actual }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError { message: message.into() }
    }

    /// Create a profile error
    pub fn profile(message: impl Into<String>) -> Self {
        Self::ProfileError { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Wrap a transaction-layer failure
    pub fn transaction(error: anyhow::Error) -> Self {
        Self::TransactionError { message: format!("{:#}", error) }
    }

    /// Wrap a persistence failure
    pub fn persistence(error: anyhow::Error) -> Self {
        Self::PersistenceError { message: format!("{:#}", error) }
    }

    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            DialogError::ProtocolError { .. } | DialogError::RouteParamError { .. } => {
                ErrorCategory::Protocol
            }
            DialogError::DialogNotFound { .. }
            | DialogError::InvalidState { .. }
            | DialogError::ProfileError { .. } => ErrorCategory::Dialog,
            DialogError::TransactionError { .. } | DialogError::PersistenceError { .. } => {
                ErrorCategory::Collaborator
            }
            DialogError::ConfigError { .. } => ErrorCategory::Configuration,
            DialogError::InternalError { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether processing of other messages can continue unaffected
    ///
    /// Everything except internal invariant violations is scoped to the
    /// message that triggered it.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Internal)
    }
}

impl From<serde_json::Error> for DialogError {
    fn from(error: serde_json::Error) -> Self {
        DialogError::ConfigError { message: format!("Serialization error: {}", error) }
    }
}
