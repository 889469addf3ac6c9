//! Error types for the measurement engine
//!
//! Two families:
//! - `SourceError`: raised by adapters, never propagated past the Resolver or
//!   Consensus boundary; converted to a reason string there
//! - `CalibrationError`: the only hard errors of the exposed API (invalid
//!   numeric input, store failures, malformed backups)

use crate::types::FailureKind;
use thiserror::Error;

/// Adapter error
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Credential missing or rejected
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// Network communication error
    #[error("network error: {0}")]
    Network(String),

    /// Provider API returned an error
    #[error("API error: {0}")]
    Api(String),

    /// Provider answered but has nothing for this location
    #[error("no data at location: {0}")]
    NoData(String),

    /// Caller deadline passed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Failed to parse provider response
    #[error("parse error: {0}")]
    Parse(String),
}

impl SourceError {
    /// Classify for tier failure reporting
    pub fn kind(&self) -> FailureKind {
        match self {
            SourceError::NoData(_) => FailureKind::NoDataAtLocation,
            SourceError::DeadlineExceeded => FailureKind::DeadlineExceeded,
            SourceError::MissingCredential(_)
            | SourceError::Network(_)
            | SourceError::Api(_)
            | SourceError::Parse(_) => FailureKind::AdapterUnavailable,
        }
    }
}

/// Calibration error
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// Invalid numeric input (programmer error upstream)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backing store failed
    #[error("Store error: {0}")]
    Store(#[from] roofcal_common::Error),

    /// Backup payload could not be restored
    #[error("Import failed: {0}")]
    Import(String),
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;
