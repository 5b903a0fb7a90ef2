use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{Region, TaxType};

/// Errors raised by rule and reduction stores.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The store did not answer (timeout, pool exhausted, poisoned lock).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A compare-and-swap close found the row already closed.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// The write would leave two versions of the same rule valid on one day.
    #[error("Overlapping rule versions: {0}")]
    Overlap(String),
}

/// Errors surfaced by the resolver, calculator and indexation engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaxError {
    /// A mandatory rule has no version in force. This is a configuration gap
    /// in the rule tables, not a transient failure.
    #[error("no {rule} in force for {region}/{tax_type} on {date}")]
    NotFound {
        region: Region,
        tax_type: TaxType,
        rule: String,
        date: NaiveDate,
    },

    /// More than one version matched a lookup.
    #[error("{count} versions of {rule} in force for {region}/{tax_type} on {date}")]
    AmbiguousRuleVersion {
        region: Region,
        tax_type: TaxType,
        rule: String,
        date: NaiveDate,
        count: usize,
    },

    /// The vehicle lacks attributes the formula needs.
    #[error("insufficient vehicle data for {region}/{tax_type}: missing {}", .missing.join(", "))]
    InsufficientData {
        region: Region,
        tax_type: TaxType,
        missing: Vec<String>,
    },

    #[error("rule store unavailable: {0}")]
    StoreUnavailable(String),

    /// A concurrent writer closed one of the rows this indexation selected.
    #[error("indexation conflict: {0}")]
    IndexationConflict(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("rule store error: {0}")]
    Store(RepositoryError),
}

impl TaxError {
    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::IndexationConflict(_))
    }
}

impl From<RepositoryError> for TaxError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Connection(msg) | RepositoryError::Unavailable(msg) => {
                Self::StoreUnavailable(msg)
            }
            RepositoryError::Conflict(msg) => Self::IndexationConflict(msg),
            other => Self::Store(other),
        }
    }
}
