//! Error types for the harvester.
//!
//! One public error enum covers the whole pipeline; per-unit failures are
//! caught in the export orchestrator and turned into status-tagged records,
//! so only run-level problems (bad input, unusable registry, no resolvable
//! boundary) propagate out of the library.

use thiserror::Error;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Invalid Gesetzesnummer format.
    #[error("Invalid Gesetzesnummer: '{0}'. Expected 4-8 digits (e.g., 10001622)")]
    InvalidGesetzesnummer(String),

    /// Invalid date format.
    #[error("Invalid date format: '{0}'. Expected YYYY-MM-DD (e.g., 2025-01-01)")]
    InvalidDate(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Definitive 404 from the portal. Absence signal, not a fault.
    #[error("Document not found (404): {url}")]
    NotFound { url: String },

    /// Non-retryable HTTP error status.
    #[error("HTTP {code} for {url}")]
    HttpStatus { code: u16, url: String },

    /// Response body shorter than the configured minimum, after retries.
    /// The portal serves disguised error pages with HTTP 200.
    #[error("Response body too short ({len} < {min} bytes) for {url}")]
    ShortBody { url: String, len: usize, min: usize },

    /// All retry attempts exhausted.
    #[error("Request failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// No unit boundary could be determined by any strategy.
    #[error("No unit boundary determinable for Gesetzesnummer {gesetzesnummer}")]
    BoundaryUnresolved { gesetzesnummer: String },

    /// Law not present in the registry.
    #[error("Law '{0}' not found in registry")]
    LawNotFound(String),

    /// Registry file could not be read or parsed.
    #[error("Failed to load law registry from {path}: {message}")]
    Registry { path: String, message: String },

    /// JSON (de)serialization error.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Whether this error means the target definitively does not exist,
    /// as opposed to a transient or structural failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvestError>;
