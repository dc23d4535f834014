//! Shared state store
//!
//! Single writer, many readers. Every mutation runs under one writer mutex
//! and builds the next state from a copy of the current one; the finished
//! state is published by swapping an `Arc`. Readers only hold the snapshot
//! lock long enough to clone that `Arc`.

use std::convert::Infallible;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::ValidationError;
use crate::models::StateModel;
use crate::protocol::Operation;

/// Immutable, self-consistent view of the shared state
#[derive(Debug)]
pub struct Snapshot<S> {
    /// Bumped by one on every state change
    pub version: u64,
    pub state: Arc<S>,
}

impl<S> Clone for Snapshot<S> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            state: Arc::clone(&self.state),
        }
    }
}

/// Result of a successful mutation attempt
#[derive(Debug, Clone)]
pub struct Applied<S> {
    /// Snapshot after the attempt (the previous one if nothing changed)
    pub snapshot: Snapshot<S>,
    pub changed: bool,
}

/// Authoritative shared state of the hub
pub struct StateStore<M: StateModel> {
    model: M,
    current: RwLock<Snapshot<M::State>>,
    writer: Mutex<()>,
}

impl<M: StateModel> StateStore<M> {
    /// Create a store holding the model's empty state
    pub fn new(model: M) -> Self {
        Self {
            model,
            current: RwLock::new(Snapshot {
                version: 0,
                state: Arc::new(M::State::default()),
            }),
            writer: Mutex::new(()),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Current snapshot
    pub fn get(&self) -> Snapshot<M::State> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Apply a mutating operation on behalf of `session`
    pub fn apply(
        &self,
        session: &str,
        op: &Operation,
    ) -> Result<Applied<M::State>, ValidationError> {
        self.mutate(|model, state| model.apply(state, session, op))
    }

    /// Create the per-client entry of a new session
    pub fn attach(&self, session: &str) -> Applied<M::State> {
        match self.mutate::<Infallible, _>(|model, state| Ok(model.attach(state, session))) {
            Ok(applied) => applied,
            Err(never) => match never {},
        }
    }

    /// Remove every entry owned by a session
    pub fn detach(&self, session: &str) -> Applied<M::State> {
        match self.mutate::<Infallible, _>(|model, state| Ok(model.detach(state, session))) {
            Ok(applied) => applied,
            Err(never) => match never {},
        }
    }

    fn mutate<E, F>(&self, f: F) -> Result<Applied<M::State>, E>
    where
        F: FnOnce(&M, &mut M::State) -> Result<bool, E>,
    {
        let _writer = self.writer.lock();

        let current = self.get();
        let mut next = (*current.state).clone();
        if !f(&self.model, &mut next)? {
            return Ok(Applied {
                snapshot: current,
                changed: false,
            });
        }

        let snapshot = Snapshot {
            version: current.version + 1,
            state: Arc::new(next),
        };
        *self.current.write() = snapshot.clone();

        Ok(Applied {
            snapshot,
            changed: true,
        })
    }
}
