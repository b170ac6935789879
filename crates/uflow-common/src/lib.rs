//! ---
//! uflow_section: "01-core-functionality"
//! uflow_subsection: "module"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "Shared primitives and utilities for the core runtime."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
//! Core shared primitives for the UserFlow workspace.
//! This crate exposes configuration loading and logging utilities consumed
//! across the workspace.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, DirectoryConfig, FetchStrategy, LoggingConfig, OrchestratorConfig, RetryConfig,
};
pub use logging::{init_tracing, LogFormat};
