//! Configuration for the dialog tracker

pub mod dialog_config;

pub use dialog_config::{DialogConfig, DEFAULT_TIMEOUT_SECS};
