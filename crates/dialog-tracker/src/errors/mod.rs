//! Error types for dialog-tracker
//!
//! This module defines the error type shared by every component of the
//! tracker. Public operations recover locally and return these as values;
//! nothing is raised across the crate boundary.

pub mod dialog_errors;

// Re-export main error types
pub use dialog_errors::{DialogError, DialogResult, ErrorCategory};
