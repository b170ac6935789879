//! ---
//! uflow_section: "02-directory-services"
//! uflow_subsection: "module"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "User directory capability trait and stub collaborators."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::UserId;

/// Failure modes of a single directory lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The lookup did not answer within the allotted window.
    #[error("lookup timed out after {elapsed:?}")]
    Timeout {
        /// How long the caller waited before giving up.
        elapsed: Duration,
    },
    /// The directory could not be reached or answered with a transient fault.
    #[error("directory unavailable: {reason}")]
    Unavailable {
        /// Transport-level detail for diagnostics.
        reason: String,
    },
    /// The directory answered but refused the request.
    #[error("lookup rejected: {reason}")]
    Rejected {
        /// Why the directory refused.
        reason: String,
    },
}

impl LookupError {
    /// Whether a retry of the same lookup can reasonably succeed.
    ///
    /// Timeouts and transient unavailability are retryable; an explicit
    /// rejection is terminal.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LookupError::Rejected { .. })
    }
}

/// Asynchronous capability exposed by a remote user directory service.
///
/// The four lookups mirror the dependency structure of the orchestration:
/// [`identity`](UserDirectory::identity) must resolve first, and the
/// remaining three depend only on the returned [`UserId`], never on each
/// other.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve the identity of the user whose record is being assembled.
    async fn identity(&self) -> Result<UserId, LookupError>;

    /// Look up the display name for the given identity.
    async fn name(&self, id: UserId) -> Result<String, LookupError>;

    /// Look up the age for the given identity.
    async fn age(&self, id: UserId) -> Result<u32, LookupError>;

    /// Look up the premium entitlement flag for the given identity.
    async fn premium(&self, id: UserId) -> Result<bool, LookupError>;
}
