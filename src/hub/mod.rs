//! The synchronization hub
//!
//! [`Hub`] ties the pieces together and manages session lifecycles:
//!
//! - `registry`: live connections and their outbound queues
//! - `store`: single-writer shared state with snapshot reads
//! - `processor`: inbound frame parsing and operation routing
//! - `scheduler`: interval or event-driven snapshot fan-out
//! - `session`: per-connection lifecycle phases
//!
//! The hub is transport-agnostic: a connection is just the sending half of a
//! bounded queue of [`Frame`]s.

mod processor;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod store;

pub use registry::{ClientSession, ConnectionRegistry};
pub use scheduler::{BroadcastReport, BroadcastScheduler};
pub use session::{SessionPhase, SessionTracker};
pub use store::{Applied, Snapshot, StateStore};

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::{BroadcastMode, HubConfig};
use crate::error::HubResult;
use crate::models::StateModel;
use crate::protocol::Frame;
use crate::types::SessionId;

/// Counters exposed over HTTP
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    /// Registered connections
    pub sessions: usize,
    /// Sessions past `init` and not yet torn down
    pub active: usize,
    pub version: u64,
    pub model: &'static str,
    pub mode: BroadcastMode,
}

/// Real-time state synchronization hub
pub struct Hub<M: StateModel> {
    registry: ConnectionRegistry,
    store: StateStore<M>,
    scheduler: BroadcastScheduler,
    sessions: SessionTracker,
    config: HubConfig,
}

impl<M: StateModel> Hub<M> {
    /// Create a hub with empty state
    pub fn new(model: M, config: HubConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            store: StateStore::new(model),
            scheduler: BroadcastScheduler::new(config.broadcast_mode, config.broadcast_interval),
            sessions: SessionTracker::new(),
            config,
        }
    }

    /// Open an outbound queue sized for this hub
    pub fn channel(&self) -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        mpsc::channel(self.config.outbound_capacity)
    }

    /// Set up a new session: assign an id, register it, create its state
    /// entry and queue the `init` message.
    pub fn connect(&self, connection: mpsc::Sender<Frame>) -> HubResult<SessionId> {
        let id = self.registry.allocate_id();
        self.sessions.begin(&id);

        let mut attached = None;
        let admitted = self
            .scheduler
            .admit(&self.registry, &id, connection, |session| {
                let applied = self.store.attach(session);
                let snapshot = applied.snapshot.clone();
                attached = Some(applied);
                snapshot
            });
        if let Err(e) = admitted {
            warn!(session_id = %id, error = %e, "session setup failed");
            self.disconnect(&id);
            return Err(e);
        }

        self.sessions.activate(&id);
        info!(session_id = %id, sessions = self.registry.len(), "session connected");

        if let Some(applied) = attached.filter(|a| a.changed) {
            self.publish(applied.snapshot);
        }
        Ok(id)
    }

    /// Process one inbound text frame from a session
    pub fn handle_message(&self, session: &str, text: &str) -> HubResult<()> {
        processor::process_text(self, session, text)
    }

    /// Process one inbound binary frame; it must hold UTF-8 JSON text
    pub fn handle_binary(&self, session: &str, bytes: &[u8]) -> HubResult<()> {
        processor::process_binary(self, session, bytes)
    }

    /// Tear a session down: unregister it and drop its state entries.
    ///
    /// Safe to call any number of times; only the first call has an effect.
    pub fn disconnect(&self, session: &str) -> bool {
        if !self.sessions.close(session) {
            return false;
        }

        self.registry.unregister(session);
        let applied = self.store.detach(session);
        info!(session_id = %session, sessions = self.registry.len(), "session closed");

        if applied.changed {
            self.publish(applied.snapshot);
        }
        true
    }

    /// Record liveness for a session (pings, pongs and other frames)
    pub fn touch(&self, session: &str) -> bool {
        self.registry.touch(session)
    }

    /// Whether a session has been silent for longer than the idle timeout
    pub fn is_idle(&self, session: &str) -> bool {
        let timeout = self.config.idle_timeout.as_millis() as i64;
        let now = chrono::Utc::now().timestamp_millis();
        self.registry
            .last_seen(session)
            .map_or(true, |seen| now - seen > timeout)
    }

    /// Broadcast the current snapshot to every session
    pub fn broadcast_now(&self) -> BroadcastReport {
        let report = self.scheduler.fan_out(
            &self.registry,
            self.store.model().snapshot_action(),
            || self.store.get(),
        );
        self.reap(&report);
        report
    }

    /// Hand a freshly changed snapshot to the scheduler
    pub(crate) fn publish(&self, snapshot: Snapshot<M::State>) {
        if !self.scheduler.is_event_driven() {
            return;
        }
        let report = self.scheduler.fan_out(
            &self.registry,
            self.store.model().snapshot_action(),
            || snapshot,
        );
        self.reap(&report);
    }

    /// Tear down every session a broadcast could not reach
    fn reap(&self, report: &BroadcastReport) {
        for failure in &report.failed {
            self.disconnect(failure.session_id());
        }
    }

    /// Broadcast on a fixed period until the task is aborted
    pub async fn run_interval(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.scheduler.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.broadcast_now();
        }
    }

    /// Start the interval broadcaster when the hub runs in interval mode
    pub fn spawn_interval_broadcaster(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.scheduler.mode() != BroadcastMode::Interval {
            return None;
        }
        info!(
            interval_ms = self.scheduler.interval().as_millis() as u64,
            "starting interval broadcaster"
        );
        Some(tokio::spawn(Arc::clone(self).run_interval()))
    }

    /// Current snapshot of the shared state
    pub fn snapshot(&self) -> Snapshot<M::State> {
        self.store.get()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            sessions: self.registry.len(),
            active: self.sessions.active_count(),
            version: self.store.version(),
            model: self.store.model().name(),
            mode: self.scheduler.mode(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &StateStore<M> {
        &self.store
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn session_phase(&self, session: &str) -> SessionPhase {
        self.sessions.phase(session)
    }
}
