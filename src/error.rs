//! Error taxonomy for provider calls, IP discovery and reconciliation cycles.

use thiserror::Error;

/// Failure of a single DNS provider API call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("credential rejected: {0}")]
    Auth(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("{count} records match {name}, refusing to pick one")]
    AmbiguousRecord { name: String, count: usize },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Only network failures, rate limiting and 5xx answers are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Auth(_))
    }
}

#[derive(Debug, Error)]
pub enum IpDiscoveryError {
    #[error("no IP discovery sources configured")]
    NoSources,

    #[error("all IP discovery sources failed: {}", format_attempts(.attempts))]
    AllSourcesFailed { attempts: Vec<(String, String)> },
}

fn format_attempts(attempts: &[(String, String)]) -> String {
    attempts
        .iter()
        .map(|(source, reason)| format!("{} ({})", source, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Why one hostname could not be reconciled. Scoped to that hostname only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordFailure {
    #[error("record lookup failed: {0}")]
    LookupFailed(ProviderError),

    #[error("record write failed: {0}")]
    WriteFailed(ProviderError),
}

/// A failure in shared setup that aborts the whole cycle before or during
/// per-hostname work.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("IP discovery failed: {0}")]
    IpDiscoveryFailed(#[from] IpDiscoveryError),

    #[error("zone resolution failed: {0}")]
    ZoneResolutionFailed(ProviderError),

    #[error("provider rejected credential: {0}")]
    Auth(String),

    #[error("cycle cancelled by shutdown")]
    Cancelled,
}
