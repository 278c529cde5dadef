//! Shared helpers for transport integration tests.

#![allow(dead_code)]

use devlink_core::DiscoveryEvent;
use devlink_transport::TransportRegistry;
use devlink_transport::mock::{MockTransport, MockTransportHandle};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::time::Duration;

/// Upper bound for any single await in these tests.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(2);

/// Build a registry of mock providers, one per tag, in the given order.
pub fn mock_registry(tags: &[&str]) -> (TransportRegistry, Vec<MockTransportHandle>) {
    let mut builder = TransportRegistry::builder();
    let mut handles = Vec::new();

    for tag in tags {
        let (provider, handle) = MockTransport::new(*tag);
        builder = builder.register(provider).expect("unique tags");
        handles.push(handle);
    }

    (builder.build(), handles)
}

/// Next event of the merged stream, failing the test if none arrives in time.
pub async fn next_event(events: &mut BoxStream<'static, DiscoveryEvent>) -> DiscoveryEvent {
    tokio::time::timeout(STEP_TIMEOUT, events.next())
        .await
        .expect("discovery event in time")
        .expect("discovery stream still open")
}

/// Collect `count` events and return their names, sorted.
pub async fn next_names(events: &mut BoxStream<'static, DiscoveryEvent>, count: usize) -> Vec<String> {
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        names.push(next_event(events).await.descriptor().name.clone());
    }
    names.sort();
    names
}
