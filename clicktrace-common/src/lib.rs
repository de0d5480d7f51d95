//! Types and utilities shared across the clicktrace crates.
//!
//! This crate holds the shared error type, observability helpers, and the
//! handful of constants every layer agrees on. It stays dependency-light so
//! the driver, extraction, and server crates can all depend on it.
//!
//! # Overview
//!
//! - [`ClicktraceError`] and [`Result`]: shared error handling
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`DEFAULT_MARKER`]: the identifier searched for when none is configured
//!
//! # Examples
//!
//! ```rust
//! use clicktrace_common::{ClicktraceError, DEFAULT_MARKER};
//!
//! let err = ClicktraceError::Navigation {
//!     url: "https://example.com".into(),
//!     message: "timed out after 60s".into(),
//! };
//! assert!(err.to_string().contains("https://example.com"));
//! assert_eq!(DEFAULT_MARKER, "clicktrackedAd_js");
//! ```

pub mod observability;

/// Identifier of the tracking value looked up on every page.
pub const DEFAULT_MARKER: &str = "clicktrackedAd_js";

/// Error types used across the clicktrace system.
#[derive(thiserror::Error, Debug)]
pub enum ClicktraceError {
    /// A driver (WebDriver session, window, frame) reported an error.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The browser could not be started or connected to.
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// The top-level page never finished loading.
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
}

/// Convenient alias for results that use [`ClicktraceError`].
pub type Result<T> = std::result::Result<T, ClicktraceError>;
