//! ---
//! uflow_section: "15-testing-qa-runbook"
//! uflow_subsection: "test"
//! uflow_type: "source"
//! uflow_scope: "test"
//! uflow_description: "End-to-end orchestration properties exercised against deterministic fakes."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::sleep;
use uuid::Uuid;

use uflow_common::config::FetchStrategy;
use uflow_directory::{
    FaultPlan, FetchStage, LookupError, StageFault, StubDirectory, StubProfile, UserDirectory,
    UserId,
};
use uflow_orchestrator::{FetchOrchestrator, OrchestratorSettings};
use uflow_resilience::RetryPolicy;
use uflow_state::{FetchEvent, FetchPhase};

const STAGE_LATENCY: Duration = Duration::from_millis(100);

fn no_retry_settings(strategy: FetchStrategy) -> OrchestratorSettings {
    OrchestratorSettings {
        strategy,
        stage_timeout: Duration::from_secs(2),
        retry: RetryPolicy::new(1, Duration::from_millis(1), Duration::ZERO),
        retry_seed: 7,
    }
}

fn ada_profile() -> StubProfile {
    StubProfile::default()
        .with_identity(UserId::new(Uuid::from_u128(42)))
        .with_record("Ada", 30, true)
        .with_latency(STAGE_LATENCY)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_wall_clock_is_additive() {
    let directory = Arc::new(StubDirectory::new(ada_profile()));
    let orchestrator =
        FetchOrchestrator::new(directory, no_retry_settings(FetchStrategy::Sequential));

    let started = Instant::now();
    let generation = orchestrator.start_fetch();
    let snapshot = orchestrator.settled(generation).await;
    let elapsed = started.elapsed();

    assert!(snapshot.result().is_some(), "fetch succeeds");
    // Four dependent lookups of 100ms each, plus scheduler jitter headroom.
    assert!(elapsed >= STAGE_LATENCY * 4, "elapsed {elapsed:?}");
    assert!(elapsed < STAGE_LATENCY * 4 + Duration::from_millis(300), "elapsed {elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_wall_clock_is_bounded_by_the_slowest_fanout() {
    let directory = Arc::new(StubDirectory::new(ada_profile()));
    let orchestrator =
        FetchOrchestrator::new(directory, no_retry_settings(FetchStrategy::Concurrent));

    let started = Instant::now();
    let generation = orchestrator.start_fetch();
    let snapshot = orchestrator.settled(generation).await;
    let elapsed = started.elapsed();

    assert!(snapshot.result().is_some(), "fetch succeeds");
    // Identity plus the joined fan-out: two lookup rounds, not four.
    assert!(elapsed >= STAGE_LATENCY * 2, "elapsed {elapsed:?}");
    assert!(elapsed < STAGE_LATENCY * 4, "elapsed {elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn loading_is_observable_before_any_suspension() {
    let directory = Arc::new(StubDirectory::new(ada_profile()));
    let orchestrator =
        FetchOrchestrator::new(directory, no_retry_settings(FetchStrategy::Concurrent));

    let generation = orchestrator.start_fetch();
    let snapshot = orchestrator.snapshot();
    assert!(snapshot.is_loading());
    assert!(snapshot.result().is_none());
    assert_eq!(snapshot.generation, generation);

    let settled = orchestrator.settled(generation).await;
    let record = settled.result().expect("fetch succeeds");
    assert_eq!(record.id, UserId::new(Uuid::from_u128(42)));
    assert_eq!(record.name, "Ada");
    assert_eq!(record.age, 30);
    assert!(record.is_premium);
    assert!(!settled.is_loading());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn name_failure_surfaces_a_typed_error_to_observers() {
    let directory = Arc::new(
        StubDirectory::new(ada_profile())
            .with_faults(FaultPlan::single(StageFault::rejected(FetchStage::Name))),
    );
    let orchestrator =
        FetchOrchestrator::new(directory, no_retry_settings(FetchStrategy::Sequential));
    let mut events = orchestrator.events();

    let generation = orchestrator.start_fetch();
    let snapshot = orchestrator.settled(generation).await;

    assert!(snapshot.result().is_none());
    assert!(!snapshot.is_loading());
    let error = snapshot.phase.error().expect("failure is surfaced");
    assert_eq!(error.stage, FetchStage::Name);

    // The broadcast delivery may land a beat after the snapshot commit.
    let notification = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let FetchEvent::Failed { generation: seen, error, .. } =
                events.recv().await.expect("event feed stays open")
            {
                return (seen, error);
            }
        }
    })
    .await
    .expect("observer receives the failure");
    assert_eq!(notification.0, generation);
    assert_eq!(notification.1.stage, FetchStage::Name);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_invocation_settles_exactly_once() {
    let directory = Arc::new(StubDirectory::new(
        ada_profile().with_latency(Duration::from_millis(10)),
    ));
    let orchestrator =
        FetchOrchestrator::new(directory, no_retry_settings(FetchStrategy::Concurrent));
    let mut events = orchestrator.events();

    let first = orchestrator.start_fetch();
    orchestrator.settled(first).await;
    let second = orchestrator.start_fetch();
    orchestrator.settled(second).await;

    // Let any straggling event deliveries drain.
    sleep(Duration::from_millis(50)).await;

    let mut terminal_per_generation = [0usize; 3];
    while let Ok(event) = events.try_recv() {
        if let FetchEvent::Completed { generation, .. } | FetchEvent::Failed { generation, .. } =
            event
        {
            terminal_per_generation[generation as usize] += 1;
        }
    }
    assert_eq!(terminal_per_generation[1], 1);
    assert_eq!(terminal_per_generation[2], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_success_reproduces_an_identical_record() {
    let directory = Arc::new(StubDirectory::new(
        ada_profile().with_latency(Duration::from_millis(10)),
    ));
    let orchestrator =
        FetchOrchestrator::new(directory, no_retry_settings(FetchStrategy::Sequential));

    let first = orchestrator.start_fetch();
    let first_record = orchestrator.settled(first).await.result().cloned().unwrap();
    let second = orchestrator.start_fetch();
    let second_record = orchestrator.settled(second).await.result().cloned().unwrap();
    assert_eq!(first_record, second_record);
}

const SLOW_RUN_ID: u128 = 0xA;
const FAST_RUN_ID: u128 = 0xB;

/// Fake directory whose first identity lookup is artificially slow and whose
/// answers encode which run they belong to.
struct SequencedDirectory {
    identity_calls: AtomicUsize,
}

impl SequencedDirectory {
    fn new() -> Self {
        Self {
            identity_calls: AtomicUsize::new(0),
        }
    }

    fn is_slow(id: UserId) -> bool {
        id == UserId::new(Uuid::from_u128(SLOW_RUN_ID))
    }
}

#[async_trait]
impl UserDirectory for SequencedDirectory {
    async fn identity(&self) -> Result<UserId, LookupError> {
        if self.identity_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            sleep(Duration::from_millis(400)).await;
            Ok(UserId::new(Uuid::from_u128(SLOW_RUN_ID)))
        } else {
            sleep(Duration::from_millis(10)).await;
            Ok(UserId::new(Uuid::from_u128(FAST_RUN_ID)))
        }
    }

    async fn name(&self, id: UserId) -> Result<String, LookupError> {
        sleep(Duration::from_millis(10)).await;
        Ok(if Self::is_slow(id) { "slow" } else { "fast" }.to_owned())
    }

    async fn age(&self, id: UserId) -> Result<u32, LookupError> {
        sleep(Duration::from_millis(10)).await;
        Ok(if Self::is_slow(id) { 1 } else { 2 })
    }

    async fn premium(&self, id: UserId) -> Result<bool, LookupError> {
        sleep(Duration::from_millis(10)).await;
        Ok(!Self::is_slow(id))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn superseded_run_never_publishes_a_stale_result() {
    let directory = Arc::new(SequencedDirectory::new());
    let orchestrator =
        FetchOrchestrator::new(directory, no_retry_settings(FetchStrategy::Concurrent));
    let mut events = orchestrator.events();

    let first = orchestrator.start_fetch();
    // Let the first run park inside its slow identity lookup.
    sleep(Duration::from_millis(50)).await;
    let second = orchestrator.start_fetch();
    let snapshot = orchestrator.settled(second).await;

    let record = snapshot.result().expect("second fetch succeeds");
    assert_eq!(record.name, "fast");
    assert_eq!(snapshot.generation, second);

    // Even after the slow run's latency has fully elapsed, the published
    // state still belongs to the superseding run.
    sleep(Duration::from_millis(500)).await;
    assert_eq!(
        orchestrator.snapshot().result().expect("still settled").name,
        "fast"
    );

    let mut completed_first = 0;
    let mut superseded_first = false;
    while let Ok(event) = events.try_recv() {
        match event {
            FetchEvent::Completed { generation, .. } if generation == first => completed_first += 1,
            FetchEvent::Superseded { generation, by, .. } => {
                assert_eq!(generation, first);
                assert_eq!(by, second);
                superseded_first = true;
            }
            _ => {}
        }
    }
    assert_eq!(completed_first, 0, "stale run must not publish");
    assert!(superseded_first, "observers are told about the supersession");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn terminal_states_match_the_documented_machine() {
    let directory = Arc::new(StubDirectory::new(
        ada_profile().with_latency(Duration::from_millis(10)),
    ));
    let orchestrator =
        FetchOrchestrator::new(directory, no_retry_settings(FetchStrategy::Sequential));

    assert!(matches!(orchestrator.snapshot().phase, FetchPhase::Idle));
    let generation = orchestrator.start_fetch();
    let settled = orchestrator.settled(generation).await;
    assert!(settled.phase.is_terminal());

    // A fresh invocation re-enters the loading state.
    orchestrator.start_fetch();
    assert!(orchestrator.snapshot().is_loading());
    orchestrator.shutdown().await;
}
