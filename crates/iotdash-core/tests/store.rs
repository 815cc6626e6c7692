//! Integration tests for the sync store, adapter and simulator.
//!
//! Every test runs against an in-memory tree, so no network is needed:
//! `cargo test --package iotdash-core --test store`

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;

use iotdash_core::{
    ConnectionState, EventReceiver, MAX_LOG_ENTRIES, MemoryConnector, MemoryTree,
    SimulationParams, Simulator, StoreEvent, SyncStore,
};
use iotdash_types::{ConnectionConfig, Device, Severity, SwitchState};

const PATH: &str = "iot/monitoring";
const WAIT: Duration = Duration::from_secs(5);

fn config() -> ConnectionConfig {
    ConnectionConfig::new("https://demo.firebaseio.com", "secret")
}

fn setup() -> (Arc<MemoryTree>, Arc<SyncStore<MemoryConnector>>) {
    let tree = Arc::new(MemoryTree::new());
    let store = SyncStore::new(MemoryConnector::with_tree(Arc::clone(&tree)));
    (tree, store)
}

/// Wait for the next snapshot delivery and return its device count.
async fn next_snapshot(events: &mut EventReceiver) -> usize {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(StoreEvent::DevicesUpdated { count }) => return count,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("no snapshot delivered")
}

/// Wait for a log entry whose message starts with `prefix`.
async fn log_starting_with(events: &mut EventReceiver, prefix: &str) -> String {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(StoreEvent::Log { entry }) if entry.message.starts_with(prefix) => {
                    return entry.message;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("log entry not recorded")
}

fn last_message(store: &SyncStore<MemoryConnector>) -> String {
    store.logs().pop().map(|e| e.message).unwrap_or_default()
}

/// Whether any log entry starts with `prefix`. Feed deliveries may log in
/// between, so connected tests do not rely on ordering.
fn logged(store: &SyncStore<MemoryConnector>, prefix: &str) -> bool {
    store.logs().iter().any(|e| e.message.starts_with(prefix))
}

// =============================================================================
// Connection lifecycle
// =============================================================================

#[tokio::test]
async fn test_connect_delivers_empty_snapshot() {
    let (_tree, store) = setup();
    let mut events = store.subscribe_events();

    store.connect(config()).await;
    assert_eq!(store.state(), ConnectionState::Connected);
    assert_eq!(next_snapshot(&mut events).await, 0);
    assert!(store.devices().is_empty());

    let messages: Vec<String> = store.logs().into_iter().map(|e| e.message).collect();
    assert_eq!(messages[0], "Attempting connection to https://demo.firebaseio.com...");
    assert!(messages.contains(&"Database connected successfully!".to_string()));
    assert!(messages.contains(&"Received device update: 0 devices".to_string()));
}

#[tokio::test]
async fn test_connect_state_transitions() {
    let (_tree, store) = setup();
    let mut events = store.subscribe_events();

    store.connect(config()).await;

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let StoreEvent::StateChanged { state } = event {
            states.push(state);
        }
    }
    assert_eq!(
        states,
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
    assert_eq!(store.config().await.unwrap().tree_path, PATH);
}

#[tokio::test]
async fn test_snapshot_replaces_tree() {
    let (tree, store) = setup();
    tree.set_json(
        PATH,
        json!({
            "lamp": {"type": "switch", "value": 1},
            "fan": {"type": "dimmer", "value": 300, "upper_limit": 1024, "unit": "RPM"}
        }),
    );
    let mut events = store.subscribe_events();

    store.connect(config()).await;
    assert_eq!(next_snapshot(&mut events).await, 2);
    assert_eq!(
        store.device("lamp"),
        Some(Device::Switch {
            value: SwitchState::On
        })
    );

    tree.set_json(PATH, json!({"temp": {"type": "sensor", "value": 21.5}}));
    assert_eq!(next_snapshot(&mut events).await, 1);
    let devices = store.devices();
    assert!(devices.get("lamp").is_none());
    assert_eq!(devices.get("temp").unwrap().value(), 21.5);
}

#[tokio::test]
async fn test_malformed_entries_are_skipped() {
    let (tree, store) = setup();
    tree.set_json(
        PATH,
        json!({
            "lamp": {"type": "switch", "value": 0},
            "relay": {"type": "relay", "value": 1}
        }),
    );
    let mut events = store.subscribe_events();

    store.connect(config()).await;
    assert_eq!(next_snapshot(&mut events).await, 1);
    assert!(
        store
            .logs()
            .iter()
            .any(|e| e.severity == Severity::Warning && e.message.contains("'relay'"))
    );
}

#[tokio::test]
async fn test_connect_failure_stays_disconnected() {
    let (tree, store) = setup();
    tree.set_should_fail(true, Some("Permission denied"));

    store.connect(config()).await;

    assert_eq!(store.state(), ConnectionState::Disconnected);
    let last = store.logs().pop().unwrap();
    assert_eq!(last.severity, Severity::Error);
    assert!(
        last.message
            .starts_with("Connection failed. Please check your credentials.")
    );
    assert!(last.message.contains("Permission denied"));
    assert!(!store.adapter().is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn test_connect_probe_timeout() {
    let (tree, store) = setup();
    tree.set_probe_hangs(true);

    store.connect(config()).await;

    assert_eq!(store.state(), ConnectionState::Disconnected);
    assert!(last_message(&store).contains("timed out"));
    assert_eq!(tree.counters().watch, 0);
}

#[tokio::test]
async fn test_open_failure_stays_disconnected() {
    let (tree, store) = setup();
    tree.set_open_fails(true);

    store.connect(config()).await;
    assert_eq!(store.state(), ConnectionState::Disconnected);
    assert_eq!(tree.counters().probe, 0);
}

#[tokio::test]
async fn test_failed_reconnect_clears_session() {
    let (tree, store) = setup();
    tree.set_json(PATH, json!({"temp": {"type": "sensor", "value": 20}}));
    let mut events = store.subscribe_events();
    store.connect(config()).await;
    next_snapshot(&mut events).await;
    assert!(store.sensor_history("temp").is_some());

    tree.set_should_fail(true, Some("Permission denied"));
    store.connect(config()).await;

    assert_eq!(store.state(), ConnectionState::Disconnected);
    assert!(store.devices().is_empty());
    assert!(store.config().await.is_none());
    assert!(store.sensor_history("temp").is_none());
    assert!(logged(&store, "Connection failed."));
}

#[tokio::test]
async fn test_subscription_error_keeps_connected() {
    let (tree, store) = setup();
    let mut events = store.subscribe_events();
    store.connect(config()).await;
    next_snapshot(&mut events).await;

    tree.emit_error("permission_denied");
    let message = log_starting_with(&mut events, "Subscription error:").await;

    assert!(message.contains("permission_denied"));
    assert_eq!(store.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_disconnect_clears_session() {
    let (tree, store) = setup();
    tree.set_json(PATH, json!({"lamp": {"type": "switch", "value": 0}}));
    let mut events = store.subscribe_events();
    store.connect(config()).await;
    next_snapshot(&mut events).await;

    store.disconnect().await;

    assert_eq!(store.state(), ConnectionState::Disconnected);
    assert!(store.devices().is_empty());
    assert!(store.config().await.is_none());
    assert!(!store.adapter().is_connected().await);

    // Remote changes after disconnect are not mirrored.
    tree.set_json(PATH, json!({"fan": {"type": "dimmer", "value": 1}}));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.devices().is_empty());
}

#[tokio::test]
async fn test_disconnect_twice() {
    let (_tree, store) = setup();
    store.connect(config()).await;

    store.disconnect().await;
    store.disconnect().await;

    assert_eq!(store.state(), ConnectionState::Disconnected);
    let disconnects = store
        .logs()
        .iter()
        .filter(|e| e.message == "Disconnected from database")
        .count();
    assert_eq!(disconnects, 2);
    assert!(store.logs().iter().all(|e| e.severity != Severity::Error));
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let (tree, store) = setup();
    tree.set_json(PATH, json!({"lamp": {"type": "switch", "value": 1}}));
    let mut events = store.subscribe_events();

    store.connect(config()).await;
    next_snapshot(&mut events).await;
    store.disconnect().await;
    store.connect(config()).await;

    assert_eq!(next_snapshot(&mut events).await, 1);
    assert_eq!(store.state(), ConnectionState::Connected);
}

// =============================================================================
// Mutations
// =============================================================================

#[tokio::test]
async fn test_mutations_after_disconnect_make_no_calls() {
    let (tree, store) = setup();
    store.connect(config()).await;
    store.disconnect().await;
    tree.reset_counters();

    store.update_device_value("lamp", 1.0).await;
    assert_eq!(last_message(&store), "Cannot update: Not connected");
    store
        .create_device("fan", Device::dimmer(1024.0, "RPM"))
        .await;
    assert_eq!(last_message(&store), "Cannot create: Not connected");
    store.delete_device("lamp").await;
    assert_eq!(last_message(&store), "Cannot delete: Not connected");
    store.simulate(10.0, 20.0).await;
    assert_eq!(last_message(&store), "Cannot simulate: Not connected");

    assert_eq!(tree.write_count(), 0);
    assert_eq!(
        store.logs().iter().rev().take(4).filter(|e| e.severity == Severity::Error).count(),
        4
    );
}

#[tokio::test]
async fn test_create_device_round_trip() {
    let (_tree, store) = setup();
    let mut events = store.subscribe_events();
    store.connect(config()).await;
    next_snapshot(&mut events).await;

    store
        .create_device("fan", Device::dimmer(1024.0, "RPM"))
        .await;
    assert!(logged(&store, "Device 'fan' created successfully"));

    assert_eq!(next_snapshot(&mut events).await, 1);
    let fan = store.device("fan").unwrap();
    assert_eq!(
        fan,
        Device::Dimmer {
            value: 0.0,
            upper_limit: Some(1024.0),
            unit: "RPM".to_string(),
        }
    );
}

#[tokio::test]
async fn test_create_device_normalizes_name() {
    let (tree, store) = setup();
    store.connect(config()).await;

    store
        .create_device("Living Room Lamp", Device::switch())
        .await;
    assert_eq!(
        tree.get("iot/monitoring/living_room_lamp"),
        json!({"type": "switch", "value": 0})
    );

    store.create_device("bad.name", Device::switch()).await;
    assert!(logged(&store, "Create failed for 'bad.name'"));
}

#[tokio::test]
async fn test_update_waits_for_echo() {
    let (tree, store) = setup();
    tree.set_json(PATH, json!({"lamp": {"type": "switch", "value": 0}}));
    let mut events = store.subscribe_events();
    store.connect(config()).await;
    next_snapshot(&mut events).await;

    store.toggle_switch("lamp").await;
    assert!(logged(&store, "Device 'lamp' updated to 1"));
    assert_eq!(tree.get("iot/monitoring/lamp/value"), json!(1));

    next_snapshot(&mut events).await;
    assert_eq!(
        store.device("lamp"),
        Some(Device::Switch {
            value: SwitchState::On
        })
    );
}

#[tokio::test]
async fn test_mutation_failures_are_logged() {
    let (tree, store) = setup();
    store.connect(config()).await;
    tree.set_should_fail(true, Some("Permission denied"));

    store.update_device_value("lamp", 1.0).await;
    assert!(logged(&store, "Update failed for 'lamp': Permission denied"));
    store.delete_device("lamp").await;
    assert!(logged(&store, "Delete failed for 'lamp': Permission denied"));
    store.create_device("lamp", Device::switch()).await;
    assert!(logged(&store, "Create failed for 'lamp': Permission denied"));
    assert_eq!(store.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_delete_device() {
    let (tree, store) = setup();
    tree.set_json(PATH, json!({"lamp": {"type": "switch", "value": 0}}));
    let mut events = store.subscribe_events();
    store.connect(config()).await;
    assert_eq!(next_snapshot(&mut events).await, 1);

    store.delete_device("lamp").await;
    assert!(logged(&store, "Device 'lamp' deleted"));
    assert_eq!(next_snapshot(&mut events).await, 0);
}

// =============================================================================
// Activity log
// =============================================================================

#[tokio::test]
async fn test_log_ring_evicts_oldest() {
    let (_tree, store) = setup();
    for i in 1..=MAX_LOG_ENTRIES + 1 {
        store.log(format!("entry {}", i), Severity::Info);
    }

    let logs = store.logs();
    assert_eq!(logs.len(), MAX_LOG_ENTRIES);
    assert_eq!(logs[0].message, "entry 2");
    assert_eq!(logs[MAX_LOG_ENTRIES - 1].message, "entry 101");

    let mut ids: Vec<_> = logs.iter().map(|e| e.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), MAX_LOG_ENTRIES);
}

// =============================================================================
// Simulation
// =============================================================================

#[tokio::test]
async fn test_simulate_respects_device_limit() {
    let (tree, store) = setup();
    tree.set_json(
        PATH,
        json!({
            "temp": {"type": "sensor", "value": 0, "upper_limit": 15, "unit": "C"},
            "lamp": {"type": "switch", "value": 0}
        }),
    );
    let mut events = store.subscribe_events();
    store.connect(config()).await;
    next_snapshot(&mut events).await;

    for _ in 0..50 {
        store.simulate(10.0, 20.0).await;
        let value = tree.get("iot/monitoring/temp/value").as_f64().unwrap();
        assert!((10.0..=15.0).contains(&value), "value {} out of range", value);
        assert_eq!(tree.get("iot/monitoring/lamp/value"), json!(0));
    }
    assert!(logged(&store, "Simulator heartbeat: Updated 1 devices"));
}

#[tokio::test]
async fn test_simulate_empty_tree_is_noop() {
    let (tree, store) = setup();
    let mut events = store.subscribe_events();
    store.connect(config()).await;
    next_snapshot(&mut events).await;

    store.simulate(0.0, 10.0).await;
    assert_eq!(tree.counters().update, 0);
    assert!(logged(&store, "Simulator heartbeat: Updated 0 devices"));
}

#[tokio::test(start_paused = true)]
async fn test_simulator_runs_until_deadline() {
    let (tree, store) = setup();
    tree.set_json(
        PATH,
        json!({"fan": {"type": "dimmer", "value": 0, "upper_limit": 1024, "unit": "RPM"}}),
    );
    let mut events = store.subscribe_events();
    store.connect(config()).await;
    next_snapshot(&mut events).await;

    let simulator = Simulator::new(Arc::clone(&store));
    assert!(
        simulator
            .start(SimulationParams::new(100.0, 200.0, 30).unwrap())
            .await
    );
    assert!(simulator.is_running());

    simulator.wait().await;

    assert!(!simulator.is_running());
    assert_eq!(tree.counters().update, 6);
    assert!(logged(&store, "Simulation completed"));
    let fan = tree.get("iot/monitoring/fan/value").as_f64().unwrap();
    assert!((100.0..=200.0).contains(&fan));
}

#[tokio::test(start_paused = true)]
async fn test_simulator_toggle_stops_run() {
    let (tree, store) = setup();
    tree.set_json(PATH, json!({"temp": {"type": "sensor", "value": 0}}));
    store.connect(config()).await;

    let simulator = Simulator::new(Arc::clone(&store));
    let params = SimulationParams::new(10.0, 20.0, 60).unwrap();

    assert!(simulator.toggle(params).await);
    assert!(simulator.params().await.is_some());
    assert!(!simulator.toggle(params).await);

    assert!(!simulator.is_running());
    assert!(logged(&store, "Simulation stopped"));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(tree.counters().update, 0);
}

#[tokio::test]
async fn test_simulator_requires_connection() {
    let (_tree, store) = setup();
    let simulator = Simulator::new(Arc::clone(&store));

    assert!(
        !simulator
            .start(SimulationParams::new(0.0, 1.0, 10).unwrap())
            .await
    );
    assert!(!simulator.is_running());
    assert!(logged(&store, "Cannot simulate: Not connected"));
}

#[tokio::test(start_paused = true)]
async fn test_simulator_rejects_overlapping_start() {
    let (_tree, store) = setup();
    store.connect(config()).await;
    let simulator = Simulator::new(Arc::clone(&store));
    let params = SimulationParams::new(0.0, 1.0, 10).unwrap();

    assert!(simulator.start(params).await);
    assert!(!simulator.start(params).await);
    assert!(simulator.stop().await);
    assert!(!simulator.stop().await);
}

// =============================================================================
// Sensor history
// =============================================================================

#[tokio::test]
async fn test_sensor_history_follows_snapshots() {
    let (tree, store) = setup();
    tree.set_json(PATH, json!({"temp": {"type": "sensor", "value": 20}}));
    let mut events = store.subscribe_events();
    store.connect(config()).await;
    next_snapshot(&mut events).await;

    tree.set_json("iot/monitoring/temp/value", json!(22.5));
    next_snapshot(&mut events).await;

    let history = store.sensor_history("temp").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.latest().unwrap().value, 22.5);
}
