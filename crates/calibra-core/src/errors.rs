use std::fmt;
use thiserror::Error;

/// Failure to read or validate `calibra.yaml`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Synchronous, non-mutating rejections returned to the caller.
#[derive(Debug, Error, PartialEq)]
pub enum CalibraError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("comparison {0} was already exported")]
    AlreadyExported(i64),

    #[error("comparison {0} has no reviewed articles to export")]
    NothingToExport(i64),
}

/// Marks a provider failure that affects every trial, not just the current one.
///
/// Extractors wrap such failures in this type; the runner detects it with
/// `anyhow::Error::downcast_ref` and stops dispatching.
#[derive(Debug, Error)]
#[error("provider unavailable: {0}")]
pub struct ProviderUnavailable(pub String);

pub fn is_systemic(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<ProviderUnavailable>().is_some())
}

/// Returns the domain error carried by `err`, if any.
pub fn as_calibra_error(err: &anyhow::Error) -> Option<&CalibraError> {
    err.chain().find_map(|cause| cause.downcast_ref::<CalibraError>())
}
