//! Integration tests for the synchronization hub
//!
//! Sessions are plain in-memory queues here; the WebSocket transport has its
//! own tests in `websocket_tests.rs`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use sync_hub::{
    BroadcastMode, CursorBoard, CursorMap, Frame, Hub, HubConfig, HubError, ModelKind,
    ProtocolError, ServerMessage, StateModel, Todo, TodoList, TransportError, ValidationError,
    ValidationPolicy,
};
use sync_hub::hub::SessionPhase;

struct TestClient {
    id: String,
    rx: mpsc::Receiver<Frame>,
}

impl TestClient {
    fn connect<M: StateModel>(hub: &Hub<M>) -> Self {
        let (tx, rx) = hub.channel();
        let id = hub.connect(tx).expect("connect failed");
        Self { id, rx }
    }

    /// All frames queued so far, decoded
    fn drain(&mut self) -> Vec<ServerMessage<Value>> {
        let mut messages = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            messages.push(serde_json::from_str(&frame).expect("invalid frame"));
        }
        messages
    }

    /// Data of the most recent snapshot message, if any
    fn last_snapshot(&mut self) -> Option<Value> {
        self.drain().into_iter().rev().find_map(|msg| match msg {
            ServerMessage::State(data) | ServerMessage::SyncData(data) => Some(data),
            _ => None,
        })
    }

    fn last_todos(&mut self) -> Vec<Todo> {
        let data = self.last_snapshot().expect("no snapshot received");
        serde_json::from_value(data).expect("snapshot is not a todo list")
    }

    fn send(&self, hub: &Hub<impl StateModel>, value: Value) -> Result<(), HubError> {
        hub.handle_message(&self.id, &value.to_string())
    }
}

fn todo_hub(mode: BroadcastMode) -> Hub<TodoList> {
    let mut config = HubConfig::for_model(ModelKind::Todos);
    config.broadcast_mode = mode;
    Hub::new(TodoList, config)
}

fn cursor_hub(mode: BroadcastMode) -> Hub<CursorBoard> {
    let mut config = HubConfig::for_model(ModelKind::Cursors);
    config.broadcast_mode = mode;
    Hub::new(CursorBoard, config)
}

#[test]
fn test_init_carries_session_id_and_state() {
    let hub = todo_hub(BroadcastMode::EventDriven);
    hub.store()
        .apply("seed", &sync_hub::Operation::Add { text: "existing".to_string() })
        .unwrap();

    let mut client = TestClient::connect(&hub);
    let messages = client.drain();

    assert_eq!(messages.len(), 1);
    match &messages[0] {
        ServerMessage::Init(init) => {
            assert_eq!(init.session_id, client.id);
            assert_eq!(init.state[0]["text"], "existing");
        }
        other => panic!("expected init, got {:?}", other),
    }
    assert_eq!(hub.session_phase(&client.id), SessionPhase::Active);
}

#[test]
fn test_three_session_todo_scenario_event_driven() {
    let hub = todo_hub(BroadcastMode::EventDriven);
    let mut a = TestClient::connect(&hub);
    let mut b = TestClient::connect(&hub);
    let mut c = TestClient::connect(&hub);
    a.drain();
    b.drain();
    c.drain();

    a.send(&hub, json!({"action": "add", "data": {"text": "buy milk"}}))
        .unwrap();

    let seen_by_b = b.last_todos();
    let seen_by_c = c.last_todos();
    assert_eq!(seen_by_b.len(), 1);
    assert_eq!(seen_by_b[0].text, "buy milk");
    assert!(!seen_by_b[0].completed);
    assert_eq!(seen_by_b, seen_by_c);

    let id = seen_by_b[0].id.clone();
    a.send(&hub, json!({"action": "toggle", "data": {"id": id}}))
        .unwrap();

    for client in [&mut a, &mut b, &mut c] {
        let todos = client.last_todos();
        assert_eq!(todos.len(), 1);
        assert!(todos[0].completed);
    }
}

#[test]
fn test_three_session_todo_scenario_interval() {
    let hub = todo_hub(BroadcastMode::Interval);
    let mut a = TestClient::connect(&hub);
    let mut b = TestClient::connect(&hub);
    let mut c = TestClient::connect(&hub);
    a.drain();
    b.drain();
    c.drain();

    a.send(&hub, json!({"action": "add", "data": {"text": "buy milk"}}))
        .unwrap();
    // Nothing goes out before the next tick
    assert!(b.drain().is_empty());

    let report = hub.broadcast_now();
    assert_eq!(report.delivered, 3);

    let todos = b.last_todos();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].text, "buy milk");
    assert!(!todos[0].completed);
    assert_eq!(c.last_todos(), todos);

    a.send(&hub, json!({"action": "toggle", "data": {"id": todos[0].id}}))
        .unwrap();
    hub.broadcast_now();

    for client in [&mut a, &mut b, &mut c] {
        assert!(client.last_todos()[0].completed);
    }
}

#[test]
fn test_failed_send_isolated_to_one_session() {
    let hub = cursor_hub(BroadcastMode::Interval);
    let mut a = TestClient::connect(&hub);
    let b = TestClient::connect(&hub);
    let mut c = TestClient::connect(&hub);
    a.drain();
    c.drain();

    let b_id = b.id.clone();
    drop(b.rx);

    let report = hub.broadcast_now();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, vec![TransportError::Closed(b_id.clone())]);
    assert!(a.last_snapshot().is_some());
    assert!(c.last_snapshot().is_some());

    assert!(!hub.registry().contains(&b_id));
    assert_eq!(hub.session_phase(&b_id), SessionPhase::Closed);

    // Next cycle neither reaches nor mentions B
    let report = hub.broadcast_now();
    assert_eq!(report.delivered, 2);
    assert!(report.failed.is_empty());
    let cursors = a.last_snapshot().unwrap();
    assert!(cursors.get(&b_id).is_none());
}

#[test]
fn test_teardown_removes_cursor_from_later_snapshots() {
    let hub = cursor_hub(BroadcastMode::Interval);
    let mut a = TestClient::connect(&hub);
    let b = TestClient::connect(&hub);

    b.send(&hub, json!({"action": "update_pos", "data": {"pos": [3, 4], "nick": "bob"}}))
        .unwrap();
    hub.broadcast_now();
    let cursors = a.last_snapshot().unwrap();
    assert_eq!(cursors[&b.id], json!({"pos": [3.0, 4.0], "nick": "bob"}));

    assert!(hub.disconnect(&b.id));
    hub.broadcast_now();

    let cursors: CursorMap = serde_json::from_value(a.last_snapshot().unwrap()).unwrap();
    assert_eq!(cursors.len(), 1);
    assert!(cursors.contains_key(&a.id));
    assert!(!hub.snapshot().state.contains_key(&b.id));
}

#[test]
fn test_event_driven_disconnect_is_broadcast() {
    let hub = cursor_hub(BroadcastMode::EventDriven);
    let mut a = TestClient::connect(&hub);
    let b = TestClient::connect(&hub);

    // A saw B arrive
    let cursors = a.last_snapshot().unwrap();
    assert!(cursors.get(&b.id).is_some());

    hub.disconnect(&b.id);
    let cursors = a.last_snapshot().unwrap();
    assert!(cursors.get(&b.id).is_none());
}

#[test]
fn test_double_disconnect_is_noop() {
    let hub = cursor_hub(BroadcastMode::EventDriven);
    let mut a = TestClient::connect(&hub);
    let b = TestClient::connect(&hub);
    a.drain();
    let version = hub.snapshot().version;

    assert!(hub.disconnect(&b.id));
    assert!(!hub.disconnect(&b.id));
    assert!(!hub.disconnect("never-connected"));

    // Exactly one detach happened and exactly one broadcast went out
    assert_eq!(hub.snapshot().version, version + 1);
    assert_eq!(a.drain().len(), 1);
}

#[test]
fn test_unknown_ids_leave_state_unchanged() {
    let hub = todo_hub(BroadcastMode::EventDriven);
    let mut a = TestClient::connect(&hub);
    a.send(&hub, json!({"action": "add", "data": {"text": "keep"}}))
        .unwrap();
    a.drain();
    let before = hub.snapshot();

    a.send(&hub, json!({"action": "remove", "data": {"id": "nope"}}))
        .unwrap();
    a.send(&hub, json!({"action": "toggle", "data": {"id": "nope"}}))
        .unwrap();

    let after = hub.snapshot();
    assert_eq!(after.version, before.version);
    assert_eq!(*after.state, *before.state);
    // Nothing changed, nothing broadcast
    assert!(a.drain().is_empty());
    assert!(hub.registry().contains(&a.id));
}

#[test]
fn test_remove_broadcasts_shorter_list() {
    let hub = todo_hub(BroadcastMode::EventDriven);
    let mut a = TestClient::connect(&hub);
    a.send(&hub, json!({"action": "add", "data": {"text": "one"}}))
        .unwrap();
    a.send(&hub, json!({"action": "add", "data": {"text": "two"}}))
        .unwrap();
    let todos = a.last_todos();
    assert_eq!(todos.len(), 2);

    a.send(&hub, json!({"action": "remove", "data": {"id": todos[0].id}}))
        .unwrap();
    let todos = a.last_todos();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].text, "two");
}

#[test]
fn test_concurrent_adds_from_many_sessions() {
    const N: usize = 24;
    let hub = Arc::new(todo_hub(BroadcastMode::EventDriven));
    let clients: Vec<TestClient> = (0..N).map(|_| TestClient::connect(&hub)).collect();

    let handles: Vec<_> = clients
        .iter()
        .enumerate()
        .map(|(i, client)| {
            let hub = Arc::clone(&hub);
            let id = client.id.clone();
            thread::spawn(move || {
                let msg = json!({"action": "add", "data": {"text": format!("todo {}", i)}});
                hub.handle_message(&id, &msg.to_string()).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = hub.snapshot();
    assert_eq!(snapshot.state.len(), N);
    assert_eq!(snapshot.version, N as u64);

    let mut texts: Vec<_> = snapshot.state.iter().map(|t| t.text.clone()).collect();
    texts.sort();
    texts.dedup();
    assert_eq!(texts.len(), N);

    // Every session is still connected and ends up on the final state
    for mut client in clients {
        assert!(hub.registry().contains(&client.id));
        assert_eq!(client.last_todos().len(), N);
    }
}

#[test]
fn test_query_answers_sender_only() {
    let hub = todo_hub(BroadcastMode::Interval);
    let mut a = TestClient::connect(&hub);
    let mut b = TestClient::connect(&hub);
    a.drain();
    b.drain();

    a.send(&hub, json!({"action": "query"})).unwrap();

    let messages = a.drain();
    assert_eq!(messages, vec![ServerMessage::State(json!([]))]);
    assert!(b.drain().is_empty());
}

#[test]
fn test_echo_answers_sender_only() {
    let hub = cursor_hub(BroadcastMode::Interval);
    let mut a = TestClient::connect(&hub);
    let mut b = TestClient::connect(&hub);
    a.drain();
    b.drain();

    a.send(&hub, json!({"action": "echo", "data": "hello"})).unwrap();

    assert_eq!(a.drain(), vec![ServerMessage::Echo(json!("hello"))]);
    assert!(b.drain().is_empty());
}

#[test]
fn test_malformed_message_keeps_session_open() {
    let hub = todo_hub(BroadcastMode::EventDriven);
    let mut a = TestClient::connect(&hub);
    a.drain();
    let version = hub.snapshot().version;

    let err = hub.handle_message(&a.id, "{not json").unwrap_err();
    assert!(matches!(err, HubError::Protocol(ProtocolError::Malformed(_))));

    let err = a
        .send(&hub, json!({"action": "teleport", "data": {}}))
        .unwrap_err();
    assert!(matches!(err, HubError::Protocol(ProtocolError::UnknownAction(_))));

    let messages = a.drain();
    assert_eq!(messages.len(), 2);
    assert!(messages
        .iter()
        .all(|m| matches!(m, ServerMessage::Error(_))));
    assert!(hub.registry().contains(&a.id));
    assert_eq!(hub.snapshot().version, version);
}

#[test]
fn test_invalid_utf8_binary_is_fatal() {
    let hub = todo_hub(BroadcastMode::EventDriven);
    let mut a = TestClient::connect(&hub);
    a.drain();

    let err = hub.handle_binary(&a.id, &[0xff, 0xfe, 0x00]).unwrap_err();
    match err {
        HubError::Protocol(e) => assert!(e.is_fatal()),
        other => panic!("unexpected error {:?}", other),
    }
    // The transport sends the final error; nothing is left in the queue
    assert!(a.drain().is_empty());
}

#[test]
fn test_binary_json_is_processed() {
    let hub = todo_hub(BroadcastMode::EventDriven);
    let mut a = TestClient::connect(&hub);
    a.drain();

    let bytes = json!({"action": "add", "data": {"text": "from bytes"}}).to_string();
    hub.handle_binary(&a.id, bytes.as_bytes()).unwrap();
    assert_eq!(a.last_todos()[0].text, "from bytes");
}

#[test]
fn test_validation_errors_ignored_by_default() {
    let hub = todo_hub(BroadcastMode::EventDriven);
    let mut a = TestClient::connect(&hub);
    a.drain();

    let err = a
        .send(&hub, json!({"action": "add", "data": {"text": ""}}))
        .unwrap_err();
    assert!(matches!(err, HubError::Validation(ValidationError::EmptyText)));
    assert!(a.drain().is_empty());
}

#[test]
fn test_validation_errors_reported_when_configured() {
    let mut config = HubConfig::for_model(ModelKind::Todos);
    config.validation_policy = ValidationPolicy::Report;
    let hub = Hub::new(TodoList, config);
    let mut a = TestClient::connect(&hub);
    a.drain();

    let _ = a.send(&hub, json!({"action": "update_pos", "data": {"pos": [1, 2]}}));
    match a.drain().as_slice() {
        [ServerMessage::Error(text)] => assert!(text.contains("not supported")),
        other => panic!("expected one error, got {:?}", other),
    }
}

#[test]
fn test_undeliverable_error_reply_closes_session() {
    let mut config = HubConfig::for_model(ModelKind::Todos);
    config.validation_policy = ValidationPolicy::Report;
    let hub = Hub::new(TodoList, config);
    let a = TestClient::connect(&hub);
    let id = a.id.clone();
    drop(a.rx);

    let err = hub
        .handle_message(&id, &json!({"action": "add", "data": {"text": " "}}).to_string())
        .unwrap_err();

    // The caller still sees the validation error; the dead session is gone
    assert!(matches!(err, HubError::Validation(ValidationError::EmptyText)));
    assert!(!hub.registry().contains(&id));
    assert_eq!(hub.session_phase(&id), SessionPhase::Closed);
}

#[test]
fn test_slow_consumer_closed_without_blocking_others() {
    let mut config = HubConfig::for_model(ModelKind::Cursors);
    config.outbound_capacity = 2;
    let hub = Hub::new(CursorBoard, config);

    let slow = TestClient::connect(&hub);
    let mut fast = TestClient::connect(&hub);

    for _ in 0..3 {
        hub.broadcast_now();
        // The fast client keeps up
        assert!(fast.last_snapshot().is_some());
    }

    assert!(!hub.registry().contains(&slow.id));
    assert_eq!(hub.session_phase(&slow.id), SessionPhase::Closed);
    assert!(!hub.snapshot().state.contains_key(&slow.id));
    assert!(hub.registry().contains(&fast.id));
}

#[test]
fn test_messages_after_teardown_are_refused() {
    let hub = todo_hub(BroadcastMode::EventDriven);
    let a = TestClient::connect(&hub);
    hub.disconnect(&a.id);

    let err = a
        .send(&hub, json!({"action": "add", "data": {"text": "ghost"}}))
        .unwrap_err();
    assert!(matches!(err, HubError::Transport(TransportError::NotRegistered(_))));
    assert!(hub.snapshot().state.is_empty());
}

#[test]
fn test_snapshot_round_trip_on_fresh_client() {
    let hub = todo_hub(BroadcastMode::Interval);
    let a = TestClient::connect(&hub);
    for text in ["milk", "eggs", "bread"] {
        a.send(&hub, json!({"action": "add", "data": {"text": text}}))
            .unwrap();
    }
    let toggle_id = hub.snapshot().state[1].id.clone();
    a.send(&hub, json!({"action": "toggle", "data": {"id": toggle_id}}))
        .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let fresh = hub.connect(tx).unwrap();
    let frame = rx.try_recv().unwrap();
    let parsed: ServerMessage<Vec<Todo>> = serde_json::from_str(&frame).unwrap();

    match parsed {
        ServerMessage::Init(init) => {
            assert_eq!(init.session_id, fresh);
            assert_eq!(init.state, *hub.snapshot().state);
            assert!(init.state[1].completed);
        }
        other => panic!("expected init, got {:?}", other),
    }
}

#[test]
fn test_cursor_update_requires_interval_tick() {
    let hub = cursor_hub(BroadcastMode::Interval);
    let mut a = TestClient::connect(&hub);
    a.drain();

    a.send(&hub, json!({"action": "update_pos", "data": {"pos": [10.5, 20], "nick": "ann"}}))
        .unwrap();
    assert!(a.drain().is_empty());

    hub.broadcast_now();
    let messages = a.drain();
    assert_eq!(messages.len(), 1);
    match &messages[0] {
        ServerMessage::SyncData(cursors) => {
            assert_eq!(cursors[&a.id]["pos"], json!([10.5, 20.0]));
            assert_eq!(cursors[&a.id]["nick"], "ann");
        }
        other => panic!("expected sync_data, got {:?}", other),
    }
}

#[tokio::test]
async fn test_interval_broadcaster_ticks() {
    let mut config = HubConfig::for_model(ModelKind::Cursors);
    config.broadcast_interval = Duration::from_millis(40);
    let hub = Arc::new(Hub::new(CursorBoard, config));
    let mut a = TestClient::connect(&hub);
    a.drain();

    let task = hub.spawn_interval_broadcaster().expect("interval mode");
    tokio::time::sleep(Duration::from_millis(150)).await;
    task.abort();

    let snapshots = a
        .drain()
        .into_iter()
        .filter(|m| matches!(m, ServerMessage::SyncData(_)))
        .count();
    // First tick fires immediately, at least one more follows
    assert!(snapshots >= 2, "only {} snapshots", snapshots);
}

#[test]
fn test_event_driven_hub_has_no_interval_task() {
    let hub = Arc::new(todo_hub(BroadcastMode::EventDriven));
    assert!(hub.spawn_interval_broadcaster().is_none());
}
