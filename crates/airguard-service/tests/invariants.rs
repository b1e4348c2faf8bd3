//! Cross-component tests for the airguard service.
//!
//! Run with:
//! ```
//! cargo test --package airguard-service --test invariants
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use airguard_service::bus::{BusEvent, ChannelObserver, DeliveryError};
use airguard_service::registry::{self, RegisterDevice};
use airguard_service::{AppState, Config, EventName, Observer, Principal};
use airguard_store::{DevicePatch, Store};
use airguard_types::Role;
use async_trait::async_trait;

fn create_state() -> Arc<AppState> {
    AppState::new(Store::open_in_memory().unwrap(), Config::default())
}

fn user(account: &str) -> Principal {
    Principal::new(account, Role::User)
}

fn named(name: String) -> RegisterDevice {
    RegisterDevice {
        name,
        ..Default::default()
    }
}

async fn connected_per_owner(state: &AppState) -> HashMap<String, usize> {
    let devices = state.store.lock().await.list_devices(None).unwrap();
    let mut counts = HashMap::new();
    for device in devices {
        let count = counts.entry(device.owner).or_insert(0);
        if device.is_connected {
            *count += 1;
        }
    }
    counts
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registry_keeps_one_connected_device() {
    let state = create_state();
    let accounts = ["alice", "bob", "carol"];

    let mut tasks = Vec::new();
    for round in 0..8 {
        for account in accounts {
            let state = Arc::clone(&state);
            tasks.push(tokio::spawn(async move {
                let principal = user(account);
                let device = registry::register_device(
                    &state,
                    &principal,
                    named(format!("{}-{}", account, round)),
                )
                .await
                .unwrap();

                // Flip connection around while other tasks register
                let patch = DevicePatch {
                    is_connected: Some(round % 2 == 0),
                    ..Default::default()
                };
                registry::update_device(&state, &principal, &device.id, patch)
                    .await
                    .unwrap();

                if round % 3 == 0 {
                    registry::delete_device(&state, &principal, &device.id)
                        .await
                        .unwrap();
                }
            }));
        }
    }
    for task in tasks {
        task.await.unwrap();
    }

    for (owner, connected) in connected_per_owner(&state).await {
        assert!(connected <= 1, "{} has {} connected devices", owner, connected);
    }
}

#[tokio::test]
async fn test_delete_connected_device_promotes_one() {
    let state = create_state();
    let alice = user("alice");
    registry::register_device(&state, &alice, named("a".into()))
        .await
        .unwrap();
    registry::register_device(&state, &alice, named("b".into()))
        .await
        .unwrap();
    let current = registry::register_device(&state, &alice, named("c".into()))
        .await
        .unwrap();

    registry::delete_device(&state, &alice, &current.id)
        .await
        .unwrap();
    assert_eq!(connected_per_owner(&state).await["alice"], 1);

    // Deleting the last devices leaves nothing connected and does not fail
    for device in registry::list_devices(&state, &alice).await.unwrap() {
        registry::delete_device(&state, &alice, &device.id)
            .await
            .unwrap();
    }
    assert!(connected_per_owner(&state).await.is_empty());
}

#[tokio::test]
async fn test_relay_command_reaches_only_latest_gateway_session() {
    let state = create_state();
    let alice = user("alice");
    let device = registry::register_device(&state, &alice, named("porch".into()))
        .await
        .unwrap();

    let mut first = state.gateway.attach();
    let mut second = state.gateway.attach();
    assert!(state.gateway.is_current(second.id));

    let patch = DevicePatch {
        relay_state: Some(false),
        ..Default::default()
    };
    registry::update_device(&state, &alice, &device.id, patch)
        .await
        .unwrap();

    let frame: serde_json::Value =
        serde_json::from_str(&second.outbound.recv().await.unwrap()).unwrap();
    assert_eq!(
        frame,
        serde_json::json!({"relayState": false, "operationDuration": "10min"})
    );
    // The superseded queue was closed on replacement
    assert!(first.outbound.recv().await.is_none());

    // A stale detach leaves the live session in place
    assert!(!state.gateway.detach(first.id));
    assert!(state.gateway.is_attached());
}

struct CountingFailure(AtomicUsize);

#[async_trait]
impl Observer for CountingFailure {
    async fn notify(&self, _event: &BusEvent) -> Result<(), DeliveryError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(DeliveryError::Closed)
    }
}

#[tokio::test]
async fn test_failing_observer_does_not_block_others() {
    let state = create_state();

    // Nobody listening is fine
    assert_eq!(state.bus.publish(EventName::UserListUpdated, &()), 0);

    let failing = Arc::new(CountingFailure(AtomicUsize::new(0)));
    state.bus.attach(failing.clone());
    let (observer, mut frames) = ChannelObserver::channel(8);
    state.bus.attach(Arc::new(observer));

    registry::register_device(&state, &user("alice"), named("porch".into()))
        .await
        .unwrap();
    let device = registry::list_devices(&state, &user("alice"))
        .await
        .unwrap()
        .remove(0);
    registry::update_device(
        &state,
        &user("alice"),
        &device.id,
        DevicePatch {
            location: Some("garden".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let frame: serde_json::Value = serde_json::from_str(&frames.recv().await.unwrap()).unwrap();
    assert_eq!(frame["event"], "deviceUpdated");
    assert_eq!(frame["data"]["location"], "garden");

    tokio::task::yield_now().await;
    assert_eq!(failing.0.load(Ordering::SeqCst), 1);
}
