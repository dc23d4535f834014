//! WebSocket connection handler
//!
//! Bridges one socket to the hub. A single task per connection multiplexes
//! the hub's outbound queue, inbound frames and the heartbeat; when any of
//! them ends the session is torn down.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, StreamExt};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{HubError, HubResult, ProtocolError};
use crate::hub::{ClientSession, Hub};
use crate::models::StateModel;
use crate::protocol::{error_frame, Frame};

/// Upper bound for a single socket write
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket upgrade handler
pub async fn ws_handler<M: StateModel>(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<Hub<M>>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Handle an individual WebSocket connection
async fn handle_socket<M: StateModel>(socket: WebSocket, hub: Arc<Hub<M>>) {
    let (tx, mut rx) = hub.channel();
    let session_id = match hub.connect(tx) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "rejected websocket connection");
            return;
        }
    };
    let Some(session) = hub.registry().get(&session_id) else {
        hub.disconnect(&session_id);
        return;
    };

    let (mut sink, mut stream) = socket.split();
    let ping_every = hub.config().ping_interval;
    let mut heartbeat = interval_at(Instant::now() + ping_every, ping_every);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Final error sent before closing on a framing violation
    let mut farewell = None;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(frame) = writable(&session, outbound) else {
                    debug!(session_id = %session_id, "session closed by hub");
                    break;
                };
                if !write(&mut sink, Message::Text(frame.to_string())).await {
                    break;
                }
            }

            inbound = stream.next() => {
                match inbound {
                    Some(Ok(msg)) => match handle_client_message(&hub, &session_id, msg) {
                        Flow::Continue => {}
                        Flow::Close => break,
                        Flow::Fail(e) => {
                            farewell = Some(error_frame(e.to_string()));
                            break;
                        }
                    },
                    Some(Err(e)) => {
                        debug!(session_id = %session_id, error = %e, "websocket read error");
                        break;
                    }
                    None => break,
                }
            }

            _ = heartbeat.tick() => {
                if hub.is_idle(&session_id) {
                    info!(session_id = %session_id, "closing idle session");
                    break;
                }
                if !write(&mut sink, Message::Ping(Vec::new())).await {
                    break;
                }
            }
        }
    }

    // Whatever is still queued is dropped with `rx`
    hub.disconnect(&session_id);
    debug!(
        session_id = %session_id,
        lifetime_ms = chrono::Utc::now().timestamp_millis() - session.connected_at(),
        "websocket closed"
    );

    if let Some(frame) = farewell {
        if !write(&mut sink, Message::Text(frame.to_string())).await {
            return;
        }
    }
    let _ = timeout(WRITE_TIMEOUT, sink.send(Message::Close(None))).await;
}

/// What the socket loop does after an inbound frame
#[derive(Debug)]
enum Flow {
    Continue,
    Close,
    /// Framing is broken: send this error, then close
    Fail(ProtocolError),
}

/// Next frame the writer may send. `None` at end of stream and once the hub
/// closed the session, even if frames are still queued.
fn writable(session: &ClientSession, outbound: Option<Frame>) -> Option<Frame> {
    outbound.filter(|_| !session.is_closed())
}

/// Handle a message from the client
fn handle_client_message<M: StateModel>(hub: &Hub<M>, session_id: &str, msg: Message) -> Flow {
    match msg {
        Message::Text(text) => flow(hub.handle_message(session_id, &text)),
        Message::Binary(bytes) => flow(hub.handle_binary(session_id, &bytes)),
        // The socket answers pings on its own
        Message::Ping(_) | Message::Pong(_) => {
            hub.touch(session_id);
            Flow::Continue
        }
        Message::Close(_) => Flow::Close,
    }
}

fn flow(result: HubResult<()>) -> Flow {
    match result {
        Ok(()) => Flow::Continue,
        Err(HubError::Protocol(e)) if e.is_fatal() => Flow::Fail(e),
        Err(HubError::Transport(_)) => Flow::Close,
        Err(_) => Flow::Continue,
    }
}

async fn write<S>(sink: &mut S, msg: Message) -> bool
where
    S: Sink<Message> + Unpin,
{
    matches!(timeout(WRITE_TIMEOUT, sink.send(msg)).await, Ok(Ok(())))
}
