//! ---
//! uflow_section: "05-resilience-fault-tolerance"
//! uflow_subsection: "module"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "Retry strategies with deterministic backoff."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Bounded retry with exponential backoff and seeded jitter.

mod retry;

pub use retry::{Retrier, RetryFailure, RetryPolicy};
