//! ---
//! uflow_section: "03-state-observation"
//! uflow_subsection: "module"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "Observable fetch state and lifecycle events."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
//! Observable orchestration state for UserFlow.
//!
//! Observers subscribe to a watch channel of [`FetchSnapshot`] values; every
//! logical update is one atomic send, so a composite result can never be seen
//! partially filled. Discrete lifecycle transitions additionally fan out as
//! [`FetchEvent`] values over a broadcast channel.
#![warn(missing_docs)]

mod cell;
mod phase;

pub use cell::{FetchEvent, StateCell};
pub use phase::{FetchError, FetchPhase, FetchSnapshot};
