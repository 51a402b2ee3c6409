// src/error.rs
//! Typed errors for adapters, the store, and request validation.

use thiserror::Error;

use crate::model::SourceKind;

/// A single adapter call failed. Always non-fatal to a scan or search.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{source_kind}: transport error: {message}")]
    Transport {
        source_kind: SourceKind,
        message: String,
    },

    #[error("{source_kind}: unexpected HTTP status {status}")]
    Status { source_kind: SourceKind, status: u16 },

    #[error("{source_kind}: malformed payload: {message}")]
    Parse {
        source_kind: SourceKind,
        message: String,
    },

    #[error("{source_kind}: deadline of {secs}s exceeded")]
    Timeout { source_kind: SourceKind, secs: u64 },
}

impl SourceError {
    pub fn source_kind(&self) -> SourceKind {
        match self {
            SourceError::Transport { source_kind, .. }
            | SourceError::Status { source_kind, .. }
            | SourceError::Parse { source_kind, .. }
            | SourceError::Timeout { source_kind, .. } => *source_kind,
        }
    }

    pub fn transport(source_kind: SourceKind, e: reqwest::Error) -> Self {
        SourceError::Transport {
            source_kind,
            message: e.to_string(),
        }
    }

    pub fn parse(source_kind: SourceKind, e: impl std::fmt::Display) -> Self {
        SourceError::Parse {
            source_kind,
            message: e.to_string(),
        }
    }
}

/// Persistence failures. A fingerprint collision is not one of these.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stored row is malformed: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Rejected external create/update request. Never reaches the pipeline.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },
}

/// Why an ad-hoc search could not run at all. Adapter failures are not here:
/// they only shrink the result set.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
