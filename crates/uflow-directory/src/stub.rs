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
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::directory::{LookupError, UserDirectory};
use crate::types::{FetchStage, UserId};
use uflow_common::config::DirectoryConfig;

/// Identity handed out when neither a fixed identity nor randomisation is configured.
pub const DEFAULT_IDENTITY: Uuid = Uuid::from_u128(0x2a);

const DEFAULT_STUB_SEED: u64 = 0x5EED_CAFE;

fn default_latency() -> Duration {
    Duration::from_secs(2)
}

/// Canned values and timing behaviour backing a [`StubDirectory`].
#[derive(Debug, Clone)]
pub struct StubProfile {
    /// Identity returned by the identity lookup; `None` draws a fresh random
    /// identity per call, mimicking a directory that mints session handles.
    pub identity: Option<UserId>,
    /// Canned display name.
    pub name: String,
    /// Canned age.
    pub age: u32,
    /// Canned premium flag.
    pub premium: bool,
    /// Fixed latency applied to every lookup.
    pub latency: Duration,
    /// Optional upper bound for uniformly drawn extra latency per lookup.
    pub jitter: Option<Duration>,
    /// Seed for the jitter generator so replays are deterministic.
    pub seed: u64,
}

impl Default for StubProfile {
    fn default() -> Self {
        Self {
            identity: Some(UserId::new(DEFAULT_IDENTITY)),
            name: "User Name".to_owned(),
            age: 20,
            premium: true,
            latency: default_latency(),
            jitter: None,
            seed: DEFAULT_STUB_SEED,
        }
    }
}

impl StubProfile {
    /// Override the canned record values.
    pub fn with_record(mut self, name: impl Into<String>, age: u32, premium: bool) -> Self {
        self.name = name.into();
        self.age = age;
        self.premium = premium;
        self
    }

    /// Override the fixed identity.
    pub fn with_identity(mut self, id: UserId) -> Self {
        self.identity = Some(id);
        self
    }

    /// Override the per-lookup latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Build a profile from the directory section of the application config.
    pub fn from_config(config: &DirectoryConfig) -> Self {
        let identity = if config.random_identity {
            None
        } else {
            Some(UserId::new(config.identity.unwrap_or(DEFAULT_IDENTITY)))
        };
        Self {
            identity,
            name: config.name.clone(),
            age: config.age,
            premium: config.premium,
            latency: config.latency,
            jitter: config.jitter,
            seed: config.seed,
        }
    }
}

/// Declarative per-stage fault injection, loaded from configuration or built
/// in tests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FaultPlan {
    /// Faults applied to matching stages; the first match wins.
    #[serde(default)]
    pub faults: Vec<StageFault>,
}

impl FaultPlan {
    /// Plan containing a single fault.
    pub fn single(fault: StageFault) -> Self {
        Self {
            faults: vec![fault],
        }
    }

    fn fault_for(&self, stage: FetchStage) -> Option<&StageFault> {
        self.faults.iter().find(|fault| fault.stage == stage)
    }
}

/// A fault applied to one lookup stage.
#[derive(Debug, Clone, Deserialize)]
pub struct StageFault {
    /// Stage the fault applies to.
    pub stage: FetchStage,
    /// Fault behaviour.
    #[serde(default)]
    pub kind: FaultKind,
    /// Extra latency injected before the lookup resolves.
    #[serde(default)]
    pub extra_latency_ms: Option<u64>,
    /// Optional human-readable reason carried into the resulting error.
    #[serde(default)]
    pub reason: Option<String>,
}

impl StageFault {
    /// Fail the stage with a transient unavailability.
    pub fn unavailable(stage: FetchStage) -> Self {
        Self {
            stage,
            kind: FaultKind::Unavailable,
            extra_latency_ms: None,
            reason: None,
        }
    }

    /// Fail the stage with a terminal rejection.
    pub fn rejected(stage: FetchStage) -> Self {
        Self {
            stage,
            kind: FaultKind::Rejected,
            extra_latency_ms: None,
            reason: None,
        }
    }

    /// Stall the stage by the given extra latency without failing it.
    pub fn stall(stage: FetchStage, extra: Duration) -> Self {
        Self {
            stage,
            kind: FaultKind::Stall,
            extra_latency_ms: Some(extra.as_millis() as u64),
            reason: None,
        }
    }
}

/// Supported stub fault behaviours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    /// Answer with [`LookupError::Unavailable`] after the stage latency.
    #[default]
    Unavailable,
    /// Answer with [`LookupError::Rejected`] after the stage latency.
    Rejected,
    /// Answer normally but only after the configured extra latency.
    Stall,
}

/// In-process stand-in for the remote user directory service.
///
/// Every lookup sleeps for the profile latency (plus jitter and any injected
/// stall) before answering with the canned values, so orchestration timing
/// properties are observable without real network I/O. Calls are recorded for
/// later inspection by tests.
#[derive(Debug)]
pub struct StubDirectory {
    profile: StubProfile,
    faults: FaultPlan,
    rng: Mutex<StdRng>,
    calls: Mutex<Vec<FetchStage>>,
}

impl StubDirectory {
    /// Create a stub from the provided profile with no faults.
    pub fn new(profile: StubProfile) -> Self {
        let rng = StdRng::seed_from_u64(profile.seed);
        Self {
            profile,
            faults: FaultPlan::default(),
            rng: Mutex::new(rng),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a stub from the directory section of the application config.
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(StubProfile::from_config(config))
    }

    /// Attach a fault plan.
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    /// Snapshot of every recorded lookup, in invocation order.
    pub fn calls(&self) -> Vec<FetchStage> {
        self.calls.lock().clone()
    }

    /// Number of recorded lookups for one stage.
    pub fn stage_calls(&self, stage: FetchStage) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|recorded| **recorded == stage)
            .count()
    }

    fn jitter_duration(&self) -> Duration {
        let Some(jitter) = self.profile.jitter else {
            return Duration::ZERO;
        };
        let jitter_ms = jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return Duration::ZERO;
        }
        let drawn = self.rng.lock().gen_range(0..=jitter_ms);
        Duration::from_millis(drawn)
    }

    async fn answer(&self, stage: FetchStage) -> Result<(), LookupError> {
        self.calls.lock().push(stage);
        let fault = self.faults.fault_for(stage);
        let mut delay = self.profile.latency + self.jitter_duration();
        if let Some(extra) = fault.and_then(|fault| fault.extra_latency_ms) {
            delay += Duration::from_millis(extra);
        }
        sleep(delay).await;

        match fault.map(|fault| fault.kind) {
            Some(FaultKind::Unavailable) => {
                let reason = fault
                    .and_then(|fault| fault.reason.clone())
                    .unwrap_or_else(|| "injected unavailability".to_owned());
                debug!(stage = %stage, %reason, "stub lookup faulted");
                Err(LookupError::Unavailable { reason })
            }
            Some(FaultKind::Rejected) => {
                let reason = fault
                    .and_then(|fault| fault.reason.clone())
                    .unwrap_or_else(|| "injected rejection".to_owned());
                debug!(stage = %stage, %reason, "stub lookup rejected");
                Err(LookupError::Rejected { reason })
            }
            Some(FaultKind::Stall) | None => Ok(()),
        }
    }
}

#[async_trait]
impl UserDirectory for StubDirectory {
    async fn identity(&self) -> Result<UserId, LookupError> {
        self.answer(FetchStage::Identity).await?;
        Ok(self.profile.identity.unwrap_or_else(UserId::random))
    }

    async fn name(&self, _id: UserId) -> Result<String, LookupError> {
        self.answer(FetchStage::Name).await?;
        Ok(self.profile.name.clone())
    }

    async fn age(&self, _id: UserId) -> Result<u32, LookupError> {
        self.answer(FetchStage::Age).await?;
        Ok(self.profile.age)
    }

    async fn premium(&self, _id: UserId) -> Result<bool, LookupError> {
        self.answer(FetchStage::Premium).await?;
        Ok(self.profile.premium)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fast_profile() -> StubProfile {
        StubProfile::default().with_latency(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn stub_answers_with_canned_values() {
        let stub = StubDirectory::new(fast_profile().with_record("Ada", 30, true));
        let id = stub.identity().await.unwrap();
        assert_eq!(id, UserId::new(DEFAULT_IDENTITY));
        assert_eq!(stub.name(id).await.unwrap(), "Ada");
        assert_eq!(stub.age(id).await.unwrap(), 30);
        assert!(stub.premium(id).await.unwrap());
    }

    #[tokio::test]
    async fn stub_observes_configured_latency() {
        let stub = StubDirectory::new(
            StubProfile::default().with_latency(Duration::from_millis(50)),
        );
        let started = Instant::now();
        stub.identity().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn fault_plan_injects_unavailability() {
        let stub = StubDirectory::new(fast_profile())
            .with_faults(FaultPlan::single(StageFault::unavailable(FetchStage::Name)));
        let id = stub.identity().await.unwrap();
        let err = stub.name(id).await.expect_err("name lookup must fault");
        assert!(err.is_retryable());
        assert!(matches!(err, LookupError::Unavailable { .. }));

        // Other stages are unaffected.
        assert_eq!(stub.age(id).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn rejections_are_terminal() {
        let stub = StubDirectory::new(fast_profile())
            .with_faults(FaultPlan::single(StageFault::rejected(FetchStage::Premium)));
        let id = stub.identity().await.unwrap();
        let err = stub.premium(id).await.expect_err("premium lookup must fault");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn calls_are_recorded_per_stage() {
        let stub = StubDirectory::new(fast_profile());
        let id = stub.identity().await.unwrap();
        stub.name(id).await.unwrap();
        stub.name(id).await.unwrap();
        assert_eq!(stub.stage_calls(FetchStage::Name), 2);
        assert_eq!(stub.stage_calls(FetchStage::Identity), 1);
        assert_eq!(stub.calls().first(), Some(&FetchStage::Identity));
    }
}
