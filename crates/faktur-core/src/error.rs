//! Error types for the extraction pipeline.
//!
//! Only *fatal* conditions become [`FakturError`]: malformed
//! configuration, invalid rule patterns, or a schema mismatch. Data
//! problems found while processing a document (missing totals, derived
//! quantities, severe mismatches) are reported as issue records on the
//! output document and never abort a run.

use thiserror::Error;

/// Fatal pipeline errors.
///
/// Every variant names the stage it came from, and configuration errors
/// additionally name the offending field, so a misconfigured template
/// can be diagnosed without re-running under a debugger.
#[derive(Error, Debug)]
pub enum FakturError {
    /// A configuration key is missing, malformed, or semantically
    /// invalid (for example a UOM rule without a `unit` capture group).
    #[error("invalid configuration in {stage} for field '{field}': {reason}")]
    ConfigError {
        /// Pipeline stage that rejected the configuration.
        stage: &'static str,
        /// Configuration field involved.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A regex in the template failed to compile.
    #[error("invalid pattern in {stage} for field '{field}': {source}")]
    PatternError {
        /// Pipeline stage that owns the pattern.
        stage: &'static str,
        /// Configuration field the pattern belongs to.
        field: String,
        /// The underlying regex compile error.
        source: regex::Error,
    },

    /// The configuration document does not match the expected schema.
    #[error("template schema mismatch: {reason}")]
    SchemaError {
        /// What failed to deserialize.
        reason: String,
    },

    /// A stage hit an unrecoverable internal inconsistency.
    #[error("{stage} failed: {reason}")]
    StageError {
        /// Stage that failed.
        stage: &'static str,
        /// Description of the failure.
        reason: String,
    },

    /// Canonical serialization failed while hashing or exporting.
    #[error("serialization failed: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Result alias used by all public pipeline APIs.
pub type Result<T> = std::result::Result<T, FakturError>;
