//! Discovery session: the current list of visible devices.
//!
//! A session folds the merged discovery stream into an ordered device list,
//! the way a device picker would present it. Devices keep the position in
//! which they were first seen.

use chrono::{DateTime, Utc};
use devlink_core::{DeviceDescriptor, DeviceId, DiscoveryEvent};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// A device currently visible to the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeenDevice {
    pub descriptor: DeviceDescriptor,
    pub first_seen: DateTime<Utc>,
}

/// Ordered set of visible devices.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySession {
    devices: Vec<SeenDevice>,
}

impl DiscoverySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one discovery event. Returns `true` if the visible list changed.
    pub fn apply(&mut self, event: DiscoveryEvent) -> bool {
        match event {
            DiscoveryEvent::Added(descriptor) => {
                match self.devices.iter_mut().find(|d| d.descriptor.id == descriptor.id) {
                    Some(existing) if existing.descriptor == descriptor => false,
                    Some(existing) => {
                        existing.descriptor = descriptor;
                        true
                    }
                    None => {
                        debug!(device = %descriptor.id, name = %descriptor.name, "Device visible");
                        self.devices.push(SeenDevice {
                            descriptor,
                            first_seen: Utc::now(),
                        });
                        true
                    }
                }
            }
            DiscoveryEvent::Removed(descriptor) => self.forget(&descriptor.id).is_some(),
        }
    }

    /// Visible devices in first-seen order.
    pub fn devices(&self) -> &[SeenDevice] {
        &self.devices
    }

    pub fn get(&self, id: &DeviceId) -> Option<&SeenDevice> {
        self.devices.iter().find(|d| &d.descriptor.id == id)
    }

    /// Drop a device from the list until discovery reports it again.
    pub fn forget(&mut self, id: &DeviceId) -> Option<SeenDevice> {
        let position = self.devices.iter().position(|d| &d.descriptor.id == id)?;
        debug!(device = %id, "Device forgotten");
        Some(self.devices.remove(position))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Fold `events` into a fresh session for at most `duration`.
    ///
    /// Returns early if the stream ends first.
    pub async fn collect_for(events: BoxStream<'static, DiscoveryEvent>, duration: Duration) -> Self {
        let mut session = Self::new();
        let mut events = events.take_until(Box::pin(tokio::time::sleep(duration)));
        while let Some(event) = events.next().await {
            session.apply(event);
        }
        session
    }
}
