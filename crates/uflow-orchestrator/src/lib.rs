//! ---
//! uflow_section: "04-fetch-orchestration"
//! uflow_subsection: "module"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "Fetch orchestration kernel coordinating dependent directory lookups."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Orchestration kernel assembling a [`UserRecord`] from four dependent
//! directory lookups.
//!
//! A [`FetchOrchestrator`] owns the observable state cell, hands out
//! subscriptions, and drives one run at a time: a superseding call to
//! [`FetchOrchestrator::start_fetch`] aborts the in-flight run and bumps the
//! generation token, so a stale run can never publish over newer state.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use uflow_common::config::{AppConfig, FetchStrategy, RetryConfig};
use uflow_directory::{FetchStage, LookupError, UserDirectory, UserRecord};
use uflow_resilience::{Retrier, RetryPolicy};
use uflow_state::{FetchError, FetchEvent, FetchSnapshot, StateCell};

pub mod metrics;

pub use metrics::{new_registry, FetchMetrics, SharedRegistry};

/// Runtime knobs for the orchestration kernel.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// Scheduling model for the identifier-dependent lookups.
    pub strategy: FetchStrategy,
    /// Per-stage timeout; expiry counts as a retryable lookup failure.
    pub stage_timeout: Duration,
    /// Retry policy applied to every stage.
    pub retry: RetryPolicy,
    /// Base seed for the per-stage retry jitter generators.
    pub retry_seed: u64,
}

impl OrchestratorSettings {
    /// Derive settings from the orchestrator and retry config sections.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            strategy: config.orchestrator.strategy,
            stage_timeout: config.orchestrator.stage_timeout,
            retry: RetryPolicy::from_config(&config.retry),
            retry_seed: config.retry.seed,
        }
    }

    /// Override the scheduling model.
    pub fn with_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            strategy: FetchStrategy::default(),
            stage_timeout: Duration::from_secs(5),
            retry: RetryPolicy::from_config(&retry),
            retry_seed: retry.seed,
        }
    }
}

struct RunHandle {
    generation: u64,
    task: JoinHandle<()>,
}

/// Coordinates the four-lookup fetch sequence and publishes results to
/// observers.
pub struct FetchOrchestrator {
    directory: Arc<dyn UserDirectory>,
    settings: OrchestratorSettings,
    state: Arc<StateCell>,
    generation: AtomicU64,
    current: Mutex<Option<RunHandle>>,
    runtime: Option<Handle>,
    metrics: Option<FetchMetrics>,
}

impl FetchOrchestrator {
    /// Create an orchestrator over the provided directory collaborator.
    pub fn new(directory: Arc<dyn UserDirectory>, settings: OrchestratorSettings) -> Self {
        Self {
            directory,
            settings,
            state: Arc::new(StateCell::new()),
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
            runtime: None,
            metrics: None,
        }
    }

    /// Attach a metrics handle.
    pub fn with_metrics(mut self, metrics: FetchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn runs onto an explicit runtime instead of the ambient one.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Scheduling model this orchestrator runs with.
    pub fn strategy(&self) -> FetchStrategy {
        self.settings.strategy
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<FetchSnapshot> {
        self.state.subscribe()
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<FetchEvent> {
        self.state.events()
    }

    /// Point-in-time read of the current snapshot.
    pub fn snapshot(&self) -> FetchSnapshot {
        self.state.snapshot()
    }

    /// Start a fetch, superseding any run still in flight.
    ///
    /// The loading snapshot for the new generation is committed before this
    /// method returns, so observers see the transition synchronously. The
    /// lookups themselves run on the spawned task. Returns the generation
    /// token identifying the run.
    pub fn start_fetch(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let prior = self.current.lock().take();
        let before = self.state.snapshot();
        self.state.begin(generation);

        if let Some(run) = prior {
            run.task.abort();
            // Only a run that had not settled counts as superseded; aborting
            // an already finished task is a no-op.
            if before.generation == run.generation && !before.phase.is_terminal() {
                self.state.supersede(run.generation, generation);
                if let Some(metrics) = &self.metrics {
                    metrics.inc_superseded();
                }
                debug!(
                    superseded = run.generation,
                    by = generation,
                    "aborted in-flight fetch"
                );
            }
        }

        let future = run_fetch(
            self.directory.clone(),
            self.settings,
            self.state.clone(),
            generation,
            self.metrics.clone(),
        );
        let task = match &self.runtime {
            Some(handle) => handle.spawn(future),
            None => tokio::spawn(future),
        };
        *self.current.lock() = Some(RunHandle { generation, task });
        generation
    }

    /// Wait until the run identified by `generation` (or any newer run that
    /// superseded it) has settled, and return the terminal snapshot.
    pub async fn settled(&self, generation: u64) -> FetchSnapshot {
        let mut receiver = self.state.subscribe();
        let settled = match receiver
            .wait_for(|snapshot| snapshot.generation >= generation && snapshot.phase.is_terminal())
            .await
        {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.state.snapshot(),
        };
        settled
    }

    /// Abort the in-flight run, if any, and wait for its task to wind down.
    pub async fn shutdown(&self) {
        let run = self.current.lock().take();
        if let Some(run) = run {
            run.task.abort();
            if let Err(err) = run.task.await {
                if !err.is_cancelled() {
                    warn!(generation = run.generation, error = %err, "fetch task join error");
                }
            }
        }
    }
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("settings", &self.settings)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

async fn run_fetch(
    directory: Arc<dyn UserDirectory>,
    settings: OrchestratorSettings,
    state: Arc<StateCell>,
    generation: u64,
    metrics: Option<FetchMetrics>,
) {
    let strategy = settings.strategy;
    let started = Instant::now();
    let outcome = assemble(directory, settings).await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(record) => {
            if state.complete(generation, record.clone()) {
                info!(
                    generation,
                    user = %record.id,
                    strategy = strategy.as_str(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "fetch completed"
                );
                if let Some(metrics) = &metrics {
                    metrics.observe_fetch(strategy.as_str(), "success", elapsed);
                }
            } else {
                debug!(generation, "fetch finished after being superseded; result discarded");
                if let Some(metrics) = &metrics {
                    metrics.inc_stale();
                }
            }
        }
        Err(error) => {
            if state.fail(generation, error.clone()) {
                warn!(
                    generation,
                    stage = %error.stage,
                    attempts = error.attempts,
                    strategy = strategy.as_str(),
                    error = %error.source,
                    "fetch failed"
                );
                if let Some(metrics) = &metrics {
                    metrics.observe_fetch(strategy.as_str(), "failed", elapsed);
                    metrics.inc_stage_failure(error.stage.as_str());
                }
            } else {
                debug!(generation, "fetch failed after being superseded; error discarded");
                if let Some(metrics) = &metrics {
                    metrics.inc_stale();
                }
            }
        }
    }
}

async fn assemble(
    directory: Arc<dyn UserDirectory>,
    settings: OrchestratorSettings,
) -> Result<UserRecord, FetchError> {
    let identity_dir = directory.clone();
    let id = lookup_stage(FetchStage::Identity, &settings, move || {
        let directory = identity_dir.clone();
        async move { directory.identity().await }
    })
    .await?;

    match settings.strategy {
        FetchStrategy::Sequential => {
            let name_dir = directory.clone();
            let name = lookup_stage(FetchStage::Name, &settings, move || {
                let directory = name_dir.clone();
                async move { directory.name(id).await }
            })
            .await?;

            let age_dir = directory.clone();
            let age = lookup_stage(FetchStage::Age, &settings, move || {
                let directory = age_dir.clone();
                async move { directory.age(id).await }
            })
            .await?;

            let premium_dir = directory.clone();
            let is_premium = lookup_stage(FetchStage::Premium, &settings, move || {
                let directory = premium_dir.clone();
                async move { directory.premium(id).await }
            })
            .await?;

            Ok(UserRecord {
                id,
                name,
                age,
                is_premium,
            })
        }
        FetchStrategy::Concurrent => {
            let name_dir = directory.clone();
            let age_dir = directory.clone();
            let premium_dir = directory.clone();
            // Fan out the three independent lookups and join them; the first
            // error wins and the remaining futures are dropped.
            let (name, age, is_premium) = tokio::try_join!(
                lookup_stage(FetchStage::Name, &settings, move || {
                    let directory = name_dir.clone();
                    async move { directory.name(id).await }
                }),
                lookup_stage(FetchStage::Age, &settings, move || {
                    let directory = age_dir.clone();
                    async move { directory.age(id).await }
                }),
                lookup_stage(FetchStage::Premium, &settings, move || {
                    let directory = premium_dir.clone();
                    async move { directory.premium(id).await }
                }),
            )?;

            Ok(UserRecord {
                id,
                name,
                age,
                is_premium,
            })
        }
    }
}

async fn lookup_stage<T, F, Fut>(
    stage: FetchStage,
    settings: &OrchestratorSettings,
    mut lookup: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LookupError>>,
{
    let stage_timeout = settings.stage_timeout;
    let mut retrier =
        Retrier::new(settings.retry).with_seed(stage_seed(settings.retry_seed, stage));
    retrier
        .run(
            stage.as_str(),
            |_attempt| {
                let call = lookup();
                async move {
                    match timeout(stage_timeout, call).await {
                        Ok(result) => result,
                        Err(_) => Err(LookupError::Timeout {
                            elapsed: stage_timeout,
                        }),
                    }
                }
            },
            LookupError::is_retryable,
        )
        .await
        .map_err(|failure| FetchError {
            stage,
            attempts: failure.attempts,
            source: failure.error,
        })
}

fn stage_seed(base: u64, stage: FetchStage) -> u64 {
    base ^ (stage as u64 + 1)
}
