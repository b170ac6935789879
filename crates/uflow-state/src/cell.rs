//! ---
//! uflow_section: "03-state-observation"
//! uflow_subsection: "module"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "Observable fetch state and lifecycle events."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::phase::{FetchError, FetchPhase, FetchSnapshot};
use uflow_directory::UserRecord;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Discrete lifecycle transition published alongside snapshot updates.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    /// A new run took over as the current generation.
    Started {
        /// Generation of the new run.
        generation: u64,
        /// Wall-clock time of the transition.
        at: DateTime<Utc>,
    },
    /// The current run committed a composed record.
    Completed {
        /// Generation of the finished run.
        generation: u64,
        /// The committed record.
        record: UserRecord,
        /// Wall-clock time of the transition.
        at: DateTime<Utc>,
    },
    /// The current run gave up with a typed failure.
    Failed {
        /// Generation of the finished run.
        generation: u64,
        /// The surfaced failure.
        error: FetchError,
        /// Wall-clock time of the transition.
        at: DateTime<Utc>,
    },
    /// An in-flight run was superseded before it could settle.
    Superseded {
        /// Generation of the abandoned run.
        generation: u64,
        /// Generation of the run that took over.
        by: u64,
        /// Wall-clock time of the transition.
        at: DateTime<Utc>,
    },
}

impl FetchEvent {
    /// Generation the event refers to.
    pub fn generation(&self) -> u64 {
        match self {
            FetchEvent::Started { generation, .. }
            | FetchEvent::Completed { generation, .. }
            | FetchEvent::Failed { generation, .. }
            | FetchEvent::Superseded { generation, .. } => *generation,
        }
    }
}

/// Single-writer cell owning the observable orchestration state.
///
/// All mutation funnels through the watch sender, which serialises commits
/// and hands every observer a consistent snapshot. The generation token is
/// re-checked under the sender's lock immediately before each mutation, so a
/// superseded run's late completion is discarded instead of clobbering newer
/// state.
#[derive(Debug)]
pub struct StateCell {
    state: watch::Sender<FetchSnapshot>,
    events: broadcast::Sender<FetchEvent>,
}

impl StateCell {
    /// Create a cell in the idle phase at generation zero.
    pub fn new() -> Self {
        let (state, _) = watch::channel(FetchSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { state, events }
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<FetchSnapshot> {
        self.state.subscribe()
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<FetchEvent> {
        self.events.subscribe()
    }

    /// Point-in-time read of the current snapshot.
    pub fn snapshot(&self) -> FetchSnapshot {
        self.state.borrow().clone()
    }

    /// Enter the loading phase for a new generation.
    ///
    /// Clearing the previous result and raising the loading flag happen in
    /// one send; a stale `begin` (racing with an even newer run) is refused.
    pub fn begin(&self, generation: u64) -> bool {
        let mut advanced = false;
        self.state.send_if_modified(|snapshot| {
            if generation <= snapshot.generation {
                return false;
            }
            *snapshot = FetchSnapshot {
                generation,
                phase: FetchPhase::Loading,
            };
            advanced = true;
            true
        });
        if advanced {
            let _ = self.events.send(FetchEvent::Started {
                generation,
                at: Utc::now(),
            });
        } else {
            debug!(generation, "stale begin discarded");
        }
        advanced
    }

    /// Commit the composed record for the given generation.
    pub fn complete(&self, generation: u64, record: UserRecord) -> bool {
        let committed = self.commit(generation, FetchPhase::Success(record.clone()));
        if committed {
            let _ = self.events.send(FetchEvent::Completed {
                generation,
                record,
                at: Utc::now(),
            });
        }
        committed
    }

    /// Commit the typed failure for the given generation.
    pub fn fail(&self, generation: u64, error: FetchError) -> bool {
        let committed = self.commit(generation, FetchPhase::Failed(error.clone()));
        if committed {
            let _ = self.events.send(FetchEvent::Failed {
                generation,
                error,
                at: Utc::now(),
            });
        }
        committed
    }

    /// Announce that an in-flight run was superseded. Event-only; the
    /// snapshot already belongs to the superseding generation.
    pub fn supersede(&self, generation: u64, by: u64) {
        let _ = self.events.send(FetchEvent::Superseded {
            generation,
            by,
            at: Utc::now(),
        });
    }

    fn commit(&self, generation: u64, phase: FetchPhase) -> bool {
        let mut committed = false;
        self.state.send_if_modified(|snapshot| {
            // Generation check under the sender lock, immediately before the
            // mutation. The loading check makes the terminal transition
            // exactly-once per run.
            if snapshot.generation != generation || !snapshot.phase.is_loading() {
                return false;
            }
            *snapshot = FetchSnapshot { generation, phase };
            committed = true;
            true
        });
        if !committed {
            debug!(generation, "stale commit discarded");
        }
        committed
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
