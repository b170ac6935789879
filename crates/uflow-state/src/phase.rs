//! ---
//! uflow_section: "03-state-observation"
//! uflow_subsection: "module"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "Observable fetch state and lifecycle events."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
use thiserror::Error;

use uflow_directory::{FetchStage, LookupError, UserRecord};

/// Typed failure surfaced to observers when any lookup stage gives up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} lookup failed after {attempts} attempt(s): {source}")]
pub struct FetchError {
    /// Stage that ultimately failed.
    pub stage: FetchStage,
    /// Number of attempts spent on the stage, retries included.
    pub attempts: usize,
    /// Final lookup error.
    #[source]
    pub source: LookupError,
}

/// Lifecycle phase of the orchestration.
///
/// `Loading` carries no record at all, so the canonical invariant — starting
/// a fetch clears the prior result — holds by construction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchPhase {
    /// No fetch has been started for this generation.
    #[default]
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The fetch completed and the composed record is available.
    Success(UserRecord),
    /// The fetch failed; the typed error describes the offending stage.
    Failed(FetchError),
}

impl FetchPhase {
    /// Whether a fetch is currently in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchPhase::Loading)
    }

    /// Whether the phase is a terminal outcome of a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchPhase::Success(_) | FetchPhase::Failed(_))
    }

    /// The composed record, present only after a successful run.
    pub fn result(&self) -> Option<&UserRecord> {
        match self {
            FetchPhase::Success(record) => Some(record),
            _ => None,
        }
    }

    /// The failure, present only after a failed run.
    pub fn error(&self) -> Option<&FetchError> {
        match self {
            FetchPhase::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Static label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchPhase::Idle => "idle",
            FetchPhase::Loading => "loading",
            FetchPhase::Success(_) => "success",
            FetchPhase::Failed(_) => "failed",
        }
    }
}

/// Consistent point-in-time view published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchSnapshot {
    /// Generation token of the run that produced this snapshot.
    pub generation: u64,
    /// Current phase.
    pub phase: FetchPhase,
}

impl FetchSnapshot {
    /// The composed record, if the current phase holds one.
    pub fn result(&self) -> Option<&UserRecord> {
        self.phase.result()
    }

    /// Whether a fetch is currently in flight.
    pub fn is_loading(&self) -> bool {
        self.phase.is_loading()
    }
}
