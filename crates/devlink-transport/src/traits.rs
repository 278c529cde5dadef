//! Transport trait definitions.
//!
//! This module defines the contract between the registry and the physical
//! transport backends. A provider discovers devices and opens connections to
//! the ids it minted; a connection exchanges raw APDU frames with one device.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro. Dynamic dispatch goes
//! through the enum wrappers in [`providers`](crate::providers).

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::providers::AnyConnection;
use bytes::Bytes;
use devlink_core::{DeviceDescriptor, DeviceId, DiscoveryEvent, TransportKind};
use futures::stream::BoxStream;
use serde_json::Value;

/// Whether a sighting announces or withdraws a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SightingKind {
    Add,
    Remove,
}

/// Provider-specific descriptor embedded in the device id payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeDescriptor {
    /// Payload stored verbatim (e.g. a proxy URL).
    Text(String),

    /// Structured payload stored as JSON (e.g. a HID path and USB ids).
    Json(Value),
}

/// Raw device sighting emitted by a provider's discovery stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub kind: SightingKind,
    pub name: String,
    pub native: NativeDescriptor,
}

impl Sighting {
    pub fn added(name: impl Into<String>, native: NativeDescriptor) -> Self {
        Self {
            kind: SightingKind::Add,
            name: name.into(),
            native,
        }
    }

    pub fn removed(name: impl Into<String>, native: NativeDescriptor) -> Self {
        Self {
            kind: SightingKind::Remove,
            name: name.into(),
            native,
        }
    }

    /// Map the sighting to a canonical discovery event.
    ///
    /// The mapping is pure: the resulting id is `<tag>|<native>` and can be
    /// handed back to the same provider's `open` without any lookup table.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag is not a valid provider tag.
    pub fn into_event(self, tag: &str, transport: TransportKind) -> Result<DiscoveryEvent> {
        let id = match &self.native {
            NativeDescriptor::Text(text) => DeviceId::tagged(tag, text)?,
            NativeDescriptor::Json(value) => DeviceId::tagged_json(tag, value)?,
        };
        let descriptor = DeviceDescriptor::new(id, self.name, transport);

        Ok(match self.kind {
            SightingKind::Add => DiscoveryEvent::Added(descriptor),
            SightingKind::Remove => DiscoveryEvent::Removed(descriptor),
        })
    }
}

/// Physical transport backend.
///
/// A provider owns its native listener resources and every device id that
/// starts with its tag. Providers are registered once in a
/// [`TransportRegistry`](crate::registry::TransportRegistry), whose
/// registration order is the dispatch priority.
///
/// # Examples
///
/// ```no_run
/// use devlink_transport::mock::MockTransport;
/// use devlink_transport::traits::TransportProvider;
/// use futures::StreamExt;
///
/// # async fn example() -> devlink_transport::Result<()> {
/// let (provider, handle) = MockTransport::new("mock");
/// handle.add_device("nano", "Nano S")?;
///
/// let mut sightings = provider.discover();
/// while let Some(sighting) = sightings.next().await {
///     let event = provider.describe(sighting?)?;
///     println!("{:?}", event);
/// }
/// # Ok(())
/// # }
/// ```
pub trait TransportProvider: Send + Sync {
    /// Prefix of every device id minted by this provider.
    fn tag(&self) -> &str;

    /// Transport kind reported in descriptors.
    fn kind(&self) -> TransportKind;

    /// Start listening for devices.
    ///
    /// The stream may run forever. An `Err` item ends this provider's
    /// discovery; the registry logs it and keeps the other providers running.
    fn discover(&self) -> BoxStream<'static, Result<Sighting>>;

    /// Open a connection to a device minted by this provider.
    ///
    /// Returns `Ok(None)` when the id is not owned by this provider, which is
    /// distinct from a failure to open a device it owns.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The native descriptor in the id cannot be decoded
    /// - The device is unreachable or the handshake fails
    async fn open(&self, id: &DeviceId) -> Result<Option<AnyConnection>>;

    /// Map one of this provider's sightings to a canonical discovery event.
    ///
    /// # Errors
    ///
    /// Returns an error if the native descriptor cannot be embedded in an id.
    fn describe(&self, sighting: Sighting) -> Result<DiscoveryEvent> {
        sighting.into_event(self.tag(), self.kind())
    }

    /// Check whether the id carries this provider's tag.
    fn owns(&self, id: &DeviceId) -> bool {
        id.has_tag(self.tag())
    }
}

/// An open channel to one device.
///
/// A connection is owned exclusively by the step that opened it and is
/// released when dropped or explicitly closed.
pub trait DeviceConnection: Send {
    /// Id the connection was opened with.
    fn id(&self) -> &DeviceId;

    /// Send one APDU and wait for the device's reply.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The connection was closed
    /// - The device disconnected during the exchange
    /// - The reply cannot be decoded
    async fn exchange(&mut self, apdu: &[u8]) -> Result<Bytes>;

    /// Enable or disable verbose tracing of exchanges.
    ///
    /// This only affects observability, never the bytes on the wire.
    fn set_debug_mode(&mut self, enabled: bool);

    /// Whether verbose tracing is enabled.
    fn debug_mode(&self) -> bool;

    /// Release the underlying native resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the native close fails.
    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_sighting_to_event() {
        let sighting = Sighting::added(
            "http://localhost:8435",
            NativeDescriptor::Text("http://localhost:8435".to_string()),
        );
        let event = sighting
            .into_event("httpdebug", TransportKind::HttpDebug)
            .unwrap();

        let descriptor = event.descriptor();
        assert!(event.is_added());
        assert_eq!(descriptor.id.as_str(), "httpdebug|http://localhost:8435");
        assert_eq!(descriptor.name, "http://localhost:8435");
        assert_eq!(descriptor.kind, TransportKind::HttpDebug);
    }

    #[test]
    fn test_json_sighting_resolves_back() {
        let native = json!({"path": "1-1.2:1.0", "product_id": 4117, "vendor_id": 11415});
        let sighting = Sighting::removed("Nano X", NativeDescriptor::Json(native.clone()));
        let event = sighting.into_event("usb", TransportKind::Usb).unwrap();

        assert!(!event.is_added());
        let id = &event.descriptor().id;
        assert!(id.has_tag("usb"));
        assert_eq!(id.decode_json::<Value>().unwrap(), native);
    }

    #[test]
    fn test_invalid_tag_rejected() {
        let sighting = Sighting::added("x", NativeDescriptor::Text("x".to_string()));
        assert!(sighting.into_event("a|b", TransportKind::Mock).is_err());
    }
}
