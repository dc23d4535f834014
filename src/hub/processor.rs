//! Mutation processor
//!
//! Turns raw inbound frames into operations and routes them: reads are
//! answered to the sender only, mutations go through the store and, when the
//! state changed, on to the scheduler.

use tracing::{debug, info, warn};

use super::Hub;
use crate::config::ValidationPolicy;
use crate::error::{HubError, HubResult, ProtocolError, TransportError};
use crate::models::StateModel;
use crate::protocol::{error_frame, Frame, Operation, ServerMessage};

pub(super) fn process_text<M: StateModel>(hub: &Hub<M>, session: &str, text: &str) -> HubResult<()> {
    // Frames still in flight after teardown must not reach the state
    if !hub.registry.touch(session) {
        return Err(TransportError::NotRegistered(session.to_string()).into());
    }

    let op = match Operation::parse(text) {
        Ok(op) => op,
        Err(e) => return reject(hub, session, e),
    };
    debug!(session_id = %session, action = op.name(), "received operation");

    match op {
        Operation::Query => {
            let action = hub.store.model().snapshot_action();
            hub.scheduler
                .unicast(&hub.registry, session, action, || hub.store.get())
                .map_err(|e| on_send_error(hub, session, e))
        }
        Operation::Echo(data) => {
            let frame = ServerMessage::<()>::Echo(data).encode()?;
            reply(hub, session, frame)
        }
        op => apply(hub, session, &op),
    }
}

pub(super) fn process_binary<M: StateModel>(
    hub: &Hub<M>,
    session: &str,
    bytes: &[u8],
) -> HubResult<()> {
    match std::str::from_utf8(bytes) {
        Ok(text) => process_text(hub, session, text),
        Err(_) => {
            if !hub.registry.touch(session) {
                return Err(TransportError::NotRegistered(session.to_string()).into());
            }
            reject(hub, session, ProtocolError::Framing)
        }
    }
}

fn apply<M: StateModel>(hub: &Hub<M>, session: &str, op: &Operation) -> HubResult<()> {
    match hub.store.apply(session, op) {
        Ok(applied) => {
            if applied.changed {
                debug!(
                    session_id = %session,
                    action = op.name(),
                    version = applied.snapshot.version,
                    "state changed"
                );
                hub.publish(applied.snapshot);
            }
            Ok(())
        }
        Err(e) => {
            info!(session_id = %session, action = op.name(), error = %e, "operation rejected");
            if hub.config.validation_policy == ValidationPolicy::Report {
                if let Err(send_err) = reply(hub, session, error_frame(e.to_string())) {
                    debug!(session_id = %session, error = %send_err, "error reply not delivered");
                }
            }
            Err(e.into())
        }
    }
}

fn reject<M: StateModel>(hub: &Hub<M>, session: &str, err: ProtocolError) -> HubResult<()> {
    warn!(session_id = %session, error = %err, "rejected inbound message");
    // The transport closes on fatal errors and sends the last error itself
    if !err.is_fatal() {
        if let Err(send_err) = reply(hub, session, error_frame(err.to_string())) {
            debug!(session_id = %session, error = %send_err, "error reply not delivered");
        }
    }
    Err(err.into())
}

fn reply<M: StateModel>(hub: &Hub<M>, session: &str, frame: Frame) -> HubResult<()> {
    hub.registry
        .send(session, frame)
        .map_err(|e| on_send_error(hub, session, e.into()))
}

fn on_send_error<M: StateModel>(hub: &Hub<M>, session: &str, err: HubError) -> HubError {
    if matches!(err, HubError::Transport(_)) {
        hub.disconnect(session);
    }
    err
}
