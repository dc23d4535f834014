//! Broadcast scheduler
//!
//! Every snapshot fan-out goes through one gate. Fan-outs are serialized and
//! a snapshot older than the last one sent is dropped, so each session sees
//! versions in non-decreasing order. `init` and `query` replies pass the same
//! gate for the same reason.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use super::registry::ConnectionRegistry;
use super::store::Snapshot;
use crate::config::BroadcastMode;
use crate::error::{HubResult, TransportError};
use crate::protocol::{Frame, ServerMessage, SnapshotAction};

/// Outcome of one fan-out
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Version of the snapshot that was sent
    pub version: u64,
    /// Sessions the frame was queued for
    pub delivered: usize,
    /// Sessions that could not take the frame; already unregistered
    pub failed: Vec<TransportError>,
    /// The snapshot was older than one already broadcast
    pub skipped: bool,
}

impl BroadcastReport {
    fn skipped(version: u64) -> Self {
        Self {
            version,
            skipped: true,
            ..Default::default()
        }
    }
}

/// Decides when snapshots go out and fans them out to every session
pub struct BroadcastScheduler {
    mode: BroadcastMode,
    interval: Duration,
    /// Highest version fanned out so far
    gate: Mutex<Option<u64>>,
}

impl BroadcastScheduler {
    pub fn new(mode: BroadcastMode, interval: Duration) -> Self {
        Self {
            mode,
            interval,
            gate: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> BroadcastMode {
        self.mode
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a state change is broadcast immediately
    pub fn is_event_driven(&self) -> bool {
        self.mode == BroadcastMode::EventDriven
    }

    /// Send one snapshot to every registered session.
    ///
    /// `latest` is read with the gate held, so an interval tick always sees a
    /// snapshot at least as new as anything already sent. The frame is
    /// encoded once and shared. A failed session does not stop delivery to
    /// the others.
    pub fn fan_out<S, F>(
        &self,
        registry: &ConnectionRegistry,
        action: SnapshotAction,
        latest: F,
    ) -> BroadcastReport
    where
        S: Serialize,
        F: FnOnce() -> Snapshot<S>,
    {
        let mut last = self.gate.lock();
        let snapshot = latest();
        if matches!(*last, Some(sent) if snapshot.version < sent) {
            debug!(version = snapshot.version, "stale snapshot skipped");
            return BroadcastReport::skipped(snapshot.version);
        }

        let frame = match ServerMessage::snapshot(action, &*snapshot.state).encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(version = snapshot.version, error = %e, "failed to serialize snapshot");
                return BroadcastReport::skipped(snapshot.version);
            }
        };

        let mut report = BroadcastReport {
            version: snapshot.version,
            ..Default::default()
        };
        for session in registry.sessions() {
            match registry.deliver(&session, Frame::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(session_id = %session.id(), error = %e, "broadcast to session failed");
                    report.failed.push(e);
                }
            }
        }
        *last = Some(snapshot.version);

        debug!(
            version = report.version,
            recipients = report.delivered,
            failed = report.failed.len(),
            "broadcast snapshot"
        );
        report
    }

    /// Register a connection and queue its `init` message as one step.
    ///
    /// `attach` runs with the gate held and returns the snapshot to send, so
    /// no broadcast can reach the session ahead of its `init`.
    pub fn admit<S, F>(
        &self,
        registry: &ConnectionRegistry,
        session_id: &str,
        connection: tokio::sync::mpsc::Sender<Frame>,
        attach: F,
    ) -> HubResult<()>
    where
        S: Serialize,
        F: FnOnce(&str) -> Snapshot<S>,
    {
        let mut last = self.gate.lock();
        registry.register_as(session_id.to_string(), connection);

        let snapshot = attach(session_id);
        let frame = ServerMessage::init(session_id.to_string(), &*snapshot.state).encode()?;
        registry.send(session_id, frame)?;

        *last = Some(last.map_or(snapshot.version, |sent| sent.max(snapshot.version)));
        Ok(())
    }

    /// Send the latest snapshot to a single session
    pub fn unicast<S, F>(
        &self,
        registry: &ConnectionRegistry,
        session_id: &str,
        action: SnapshotAction,
        latest: F,
    ) -> HubResult<()>
    where
        S: Serialize,
        F: FnOnce() -> Snapshot<S>,
    {
        let mut last = self.gate.lock();
        let snapshot = latest();
        let frame = ServerMessage::snapshot(action, &*snapshot.state).encode()?;
        registry.send(session_id, frame)?;

        *last = Some(last.map_or(snapshot.version, |sent| sent.max(snapshot.version)));
        Ok(())
    }
}
