//! Connection registry
//!
//! Owns every live [`ClientSession`]. Iteration works on a point-in-time copy
//! of the session list, so registering or unregistering during a broadcast
//! never blocks or invalidates it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::error::TransportError;
use crate::protocol::Frame;
use crate::types::{new_session_id, SessionId};

/// One registered connection
pub struct ClientSession {
    id: SessionId,
    /// Sending half of the bounded outbound queue; `None` once closed
    connection: Mutex<Option<mpsc::Sender<Frame>>>,
    /// Set once the hub closed the session; frames still queued are stale
    closed: AtomicBool,
    /// Unix timestamp in milliseconds of the last inbound frame
    last_seen: AtomicI64,
    connected_at: i64,
}

impl ClientSession {
    fn new(id: SessionId, connection: mpsc::Sender<Frame>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id,
            connection: Mutex::new(Some(connection)),
            closed: AtomicBool::new(false),
            last_seen: AtomicI64::new(now),
            connected_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn last_seen(&self) -> i64 {
        self.last_seen.load(Ordering::Relaxed)
    }

    pub fn connected_at(&self) -> i64 {
        self.connected_at
    }

    fn touch(&self) {
        self.last_seen
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Whether the hub closed this session. A transport writer must stop
    /// once this is set and discard whatever is still queued.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark closed and drop the outbound sender
    fn close(&self) {
        let mut connection = self.connection.lock();
        self.closed.store(true, Ordering::Release);
        connection.take();
    }

    fn try_send(&self, frame: Frame) -> Result<(), TransportError> {
        let guard = self.connection.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(TransportError::Closed(self.id.clone()));
        };
        tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::SlowConsumer(self.id.clone()),
            TrySendError::Closed(_) => TransportError::Closed(self.id.clone()),
        })
    }
}

/// Registry of live sessions indexed by id
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<ClientSession>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection under a freshly generated id
    pub fn register(&self, connection: mpsc::Sender<Frame>) -> SessionId {
        let id = self.allocate_id();
        self.register_as(id.clone(), connection);
        id
    }

    /// Generate an id not used by any live session
    pub fn allocate_id(&self) -> SessionId {
        loop {
            let id = new_session_id();
            if !self.contains(&id) {
                return id;
            }
        }
    }

    /// Register a connection under a caller-chosen id, replacing any previous
    /// session with that id
    pub fn register_as(&self, id: SessionId, connection: mpsc::Sender<Frame>) {
        let session = Arc::new(ClientSession::new(id.clone(), connection));
        if let Some(previous) = self.sessions.write().insert(id, session) {
            previous.close();
        }
    }

    /// Remove a session and close its outbound queue.
    ///
    /// Returns `false` if the session was not registered.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id);
        match removed {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Queue a frame for one session.
    ///
    /// A full or closed queue unregisters the session and returns the error.
    pub fn send(&self, id: &str, frame: Frame) -> Result<(), TransportError> {
        let session = self
            .get(id)
            .ok_or_else(|| TransportError::NotRegistered(id.to_string()))?;
        self.deliver(&session, frame)
    }

    /// Queue a frame for a session obtained from [`Self::sessions`]
    pub(crate) fn deliver(
        &self,
        session: &ClientSession,
        frame: Frame,
    ) -> Result<(), TransportError> {
        session.try_send(frame).map_err(|e| {
            debug!(session_id = %session.id(), error = %e, "send failed, unregistering");
            self.unregister(session.id());
            e
        })
    }

    /// Run `f` for every session live at the time of the call
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ClientSession),
    {
        for session in self.sessions() {
            f(&session);
        }
    }

    /// Point-in-time copy of the live sessions
    pub fn sessions(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Ids of the live sessions
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ClientSession>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Record inbound activity. Returns `false` for unknown sessions.
    pub fn touch(&self, id: &str) -> bool {
        match self.get(id) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    pub fn last_seen(&self, id: &str) -> Option<i64> {
        self.get(id).map(|s| s.last_seen())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
