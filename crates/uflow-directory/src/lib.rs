//! ---
//! uflow_section: "02-directory-services"
//! uflow_subsection: "module"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "User directory capability trait and stub collaborators."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
//! Remote user directory collaborator for the UserFlow orchestrator.
//!
//! The orchestrator is written against the [`UserDirectory`] trait so that
//! production transports and deterministic fakes are interchangeable. This
//! crate ships the trait, the domain types it speaks, and a fixed-latency
//! [`StubDirectory`] with declarative fault injection for demos and tests.
#![warn(missing_docs)]

mod directory;
mod stub;
mod types;

pub use directory::{LookupError, UserDirectory};
pub use stub::{FaultKind, FaultPlan, StageFault, StubDirectory, StubProfile};
pub use types::{FetchStage, UserId, UserRecord};
