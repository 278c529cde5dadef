//! Integration tests for discovery merging and open dispatch.

mod common;

use common::{mock_registry, next_event, next_names};
use devlink_core::{DeviceId, TransportKind};
use devlink_transport::TransportError;
use devlink_transport::traits::DeviceConnection;

#[tokio::test]
async fn test_discovery_merges_every_provider() {
    let (registry, handles) = mock_registry(&["alpha", "beta"]);
    handles[0].add_device("a1", "Alpha One").unwrap();
    handles[1].add_device("b1", "Beta One").unwrap();

    let mut events = registry.discover_all();
    assert_eq!(next_names(&mut events, 2).await, vec!["Alpha One", "Beta One"]);

    handles[1].add_device("b2", "Beta Two").unwrap();
    let event = next_event(&mut events).await;
    assert!(event.is_added());
    assert_eq!(event.descriptor().id.as_str(), "beta|b2");
    assert_eq!(event.descriptor().kind, TransportKind::Mock);
}

#[tokio::test]
async fn test_failing_provider_does_not_stop_the_others() {
    let (registry, handles) = mock_registry(&["alpha", "beta"]);
    let mut events = registry.discover_all();

    handles[0].fail_discovery("adapter unplugged");
    handles[0].add_device("a1", "Alpha One").unwrap();
    handles[1].add_device("b1", "Beta One").unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.descriptor().name, "Beta One");

    handles[1].add_device("b2", "Beta Two").unwrap();
    let event = next_event(&mut events).await;
    assert_eq!(event.descriptor().name, "Beta Two");
}

#[tokio::test]
async fn test_provider_failing_at_start_is_isolated() {
    let (registry, handles) = mock_registry(&["alpha", "beta"]);
    handles[0].fail_discovery("no adapter");
    handles[1].add_device("b1", "Beta One").unwrap();

    let mut events = registry.discover_all();
    let event = next_event(&mut events).await;
    assert_eq!(event.descriptor().id.as_str(), "beta|b1");
}

#[tokio::test]
async fn test_removal_carries_the_same_id() {
    let (registry, handles) = mock_registry(&["alpha"]);
    let added = handles[0].add_device("a1", "Alpha One").unwrap();

    let mut events = registry.discover_all();
    assert_eq!(next_event(&mut events).await.descriptor().id, added);

    assert!(handles[0].remove_device("a1"));
    let event = next_event(&mut events).await;
    assert!(!event.is_added());
    assert_eq!(event.descriptor().id, added);
}

#[tokio::test]
async fn test_open_calls_only_the_owning_provider() {
    let (registry, handles) = mock_registry(&["alpha", "beta", "gamma"]);
    let id = handles[1].add_device("b1", "Beta One").unwrap();

    let connection = registry.open(&id).await.unwrap();
    assert_eq!(connection.id(), &id);

    let calls: Vec<_> = handles.iter().map(|h| h.open_calls()).collect();
    assert_eq!(calls, vec![0, 1, 0]);
}

#[tokio::test]
async fn test_owner_failure_is_returned_without_fallback() {
    let (registry, handles) = mock_registry(&["alpha", "beta"]);
    let id = handles[0].add_device("a1", "Alpha One").unwrap();
    handles[0].fail_next_open("device busy");

    let error = registry.open(&id).await.unwrap_err();
    assert!(matches!(error, TransportError::OpenFailed { .. }));
    assert_eq!(handles[1].open_calls(), 0);
}

#[tokio::test]
async fn test_unclaimed_id_is_not_found() {
    let (registry, handles) = mock_registry(&["alpha", "beta"]);
    let id: DeviceId = "ble|AA:BB:CC".parse().unwrap();

    let error = registry.open(&id).await.unwrap_err();
    assert_eq!(error.to_string(), "Can't find handler to open ble|AA:BB:CC");
    assert!(handles.iter().all(|h| h.open_calls() == 0));
}

#[tokio::test]
async fn test_exchange_through_registry_connection() {
    let (registry, handles) = mock_registry(&["alpha"]);
    let id = handles[0].add_device("a1", "Alpha One").unwrap();
    handles[0].push_response(vec![0x33, 0x90, 0x00]);

    let mut connection = registry.open(&id).await.unwrap();
    let reply = connection.exchange(&[0xE0, 0xC4, 0x00, 0x00]).await.unwrap();
    assert_eq!(reply.as_ref(), &[0x33, 0x90, 0x00]);

    connection.close().await.unwrap();
    assert_eq!(handles[0].open_connections(), 0);
}
