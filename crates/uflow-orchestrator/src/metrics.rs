//! ---
//! uflow_section: "04-fetch-orchestration"
//! uflow_subsection: "module"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "Fetch orchestration kernel coordinating dependent directory lookups."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
//! Prometheus instrumentation for the orchestration kernel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

/// Shared registry type used across the workspace.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Metrics published by the fetch orchestrator.
#[derive(Clone)]
pub struct FetchMetrics {
    registry: SharedRegistry,
    fetches_total: IntCounterVec,
    fetch_duration_seconds: HistogramVec,
    stage_failures_total: IntCounterVec,
    superseded_total: IntCounter,
    stale_results_total: IntCounter,
}

impl FetchMetrics {
    /// Register the fetch metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let fetches_total = IntCounterVec::new(
            Opts::new(
                "uflow_fetches_total",
                "Total number of settled fetch runs by strategy and outcome",
            ),
            &["strategy", "outcome"],
        )?;
        registry.register(Box::new(fetches_total.clone()))?;

        let histogram_opts = HistogramOpts::new(
            "uflow_fetch_duration_seconds",
            "Observed wall-clock duration of settled fetch runs",
        )
        .buckets(prometheus::exponential_buckets(0.01, 2.0, 12)?);
        let fetch_duration_seconds = HistogramVec::new(histogram_opts, &["strategy"])?;
        registry.register(Box::new(fetch_duration_seconds.clone()))?;

        let stage_failures_total = IntCounterVec::new(
            Opts::new(
                "uflow_stage_failures_total",
                "Lookup stages that exhausted their retry budget",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(stage_failures_total.clone()))?;

        let superseded_total = IntCounter::new(
            "uflow_superseded_total",
            "In-flight runs aborted because a newer fetch took over",
        )?;
        registry.register(Box::new(superseded_total.clone()))?;

        let stale_results_total = IntCounter::new(
            "uflow_stale_results_total",
            "Late completions discarded by the generation check",
        )?;
        registry.register(Box::new(stale_results_total.clone()))?;

        Ok(Self {
            registry,
            fetches_total,
            fetch_duration_seconds,
            stage_failures_total,
            superseded_total,
            stale_results_total,
        })
    }

    /// Expose the underlying shared registry for embedding.
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Record a settled run with its outcome label and duration.
    pub fn observe_fetch(&self, strategy: &str, outcome: &str, duration: Duration) {
        self.fetches_total
            .with_label_values(&[strategy, outcome])
            .inc();
        self.fetch_duration_seconds
            .with_label_values(&[strategy])
            .observe(duration.as_secs_f64());
    }

    /// Bump the failure counter for the provided stage label.
    pub fn inc_stage_failure(&self, stage: &str) {
        self.stage_failures_total.with_label_values(&[stage]).inc();
    }

    /// Count a run aborted in favour of a newer one.
    pub fn inc_superseded(&self) {
        self.superseded_total.inc();
    }

    /// Count a late completion discarded by the generation check.
    pub fn inc_stale(&self) {
        self.stale_results_total.inc();
    }
}

impl std::fmt::Debug for FetchMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchMetrics").finish_non_exhaustive()
    }
}
