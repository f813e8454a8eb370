use std::fmt;
use std::net::IpAddr;

use crate::dns::{ObservedRecord, Zone};
use crate::error::{ProviderError, RecordFailure};

/// Result of reconciling one hostname in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Created,
    Updated { previous: String },
    Failed(RecordFailure),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Unchanged => "unchanged",
            Outcome::Created => "created",
            Outcome::Updated { .. } => "updated",
            Outcome::Failed(_) => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Outcome::Created | Outcome::Updated { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Updated { previous } => write!(f, "updated (was {})", previous),
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

impl RecordFailure {
    pub fn provider_error(&self) -> &ProviderError {
        match self {
            RecordFailure::LookupFailed(e) | RecordFailure::WriteFailed(e) => e,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOutcome {
    pub hostname: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub ip: IpAddr,
    pub zone: Zone,
    pub outcomes: Vec<HostOutcome>,
}

impl CycleReport {
    /// True only if no hostname failed.
    pub fn is_success(&self) -> bool {
        !self.outcomes.iter().any(|o| o.outcome.is_failure())
    }

    pub fn failed(&self) -> impl Iterator<Item = &HostOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_failure())
    }

    pub fn writes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_write()).count()
    }

    pub fn outcome(&self, hostname: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.hostname == hostname)
            .map(|o| &o.outcome)
    }
}

/// What a cycle would do for one hostname, computed without writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    Create,
    Keep { current: ObservedRecord },
    Update { current: ObservedRecord },
    Unknown(ProviderError),
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub ip: IpAddr,
    pub zone: Zone,
    pub actions: Vec<(String, PlannedAction)>,
}
