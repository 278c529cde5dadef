//! Transport registry.
//!
//! The registry is the single entry point for discovery and for opening
//! devices. It is built once at startup, then shared read-only (typically in
//! an `Arc`), so there is no global mutable provider list.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐
//! │ usb      │──┐
//! └──────────┘  │    ┌──────────────┐
//! ┌──────────┐  ├───►│ select_all   │──────► DiscoveryEvent stream
//! │ httpdebug│──┤    └──────────────┘
//! └──────────┘  │
//! ┌──────────┐  │    open("usb|...") ──► first provider whose tag matches
//! │ mock     │──┘
//! └──────────┘
//! ```
//!
//! Each provider's stream is wrapped so that an error ends only that
//! provider's discovery; the merged stream keeps going for the others.

use crate::debug;
use crate::providers::{AnyConnection, AnyTransportProvider, HttpDebugProvider};
use crate::traits::{DeviceConnection, TransportProvider};
use crate::{Result, TransportError};
use devlink_core::{DeviceId, DiscoveryEvent, LinkConfig};
use futures::StreamExt;
use futures::future;
use futures::stream::{self, BoxStream};
use tracing::{debug, warn};

/// Ordered set of transport providers.
#[derive(Debug, Default)]
pub struct TransportRegistry {
    providers: Vec<AnyTransportProvider>,
}

/// Builder for [`TransportRegistry`]. Registration order is dispatch order.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    providers: Vec<AnyTransportProvider>,
}

impl RegistryBuilder {
    /// Add a provider.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTag` if a provider with the same tag is already
    /// registered.
    pub fn register(mut self, provider: impl Into<AnyTransportProvider>) -> Result<Self> {
        let provider = provider.into();
        let tag = provider.tag();
        if self.providers.iter().any(|existing| existing.tag() == tag) {
            return Err(TransportError::DuplicateTag {
                tag: tag.to_string(),
            });
        }

        debug!(tag, kind = %provider.kind(), "Registered transport provider");
        self.providers.push(provider);
        Ok(self)
    }

    pub fn build(self) -> TransportRegistry {
        TransportRegistry {
            providers: self.providers,
        }
    }
}

impl TransportRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Build the registry for the real transports enabled by `config`.
    ///
    /// USB HID is registered when the `hardware-hid` feature is on, the HTTP
    /// debug provider when at least one proxy URL is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider cannot be initialized.
    pub fn from_config(config: &LinkConfig) -> Result<Self> {
        #[allow(unused_mut)]
        let mut builder = Self::builder();

        #[cfg(feature = "hardware-hid")]
        {
            builder = builder.register(crate::providers::HidProvider::from_config(config))?;
        }

        if !config.proxy_urls().is_empty() {
            builder = builder.register(HttpDebugProvider::from_config(config)?)?;
        }

        Ok(builder.build())
    }

    pub fn providers(&self) -> &[AnyTransportProvider] {
        &self.providers
    }

    /// Provider tags in dispatch order.
    pub fn tags(&self) -> Vec<&str> {
        self.providers.iter().map(|provider| provider.tag()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Merge the discovery streams of every provider.
    ///
    /// A provider that fails is logged and drops out; the others continue.
    /// The merged stream ends once every provider's stream has ended.
    pub fn discover_all(&self) -> BoxStream<'static, DiscoveryEvent> {
        let streams = self.providers.iter().map(|provider| {
            let tag = provider.tag().to_string();
            let kind = provider.kind();

            provider
                .discover()
                .map(move |item| {
                    let event = item.and_then(|sighting| sighting.into_event(&tag, kind));
                    (tag.clone(), event)
                })
                .scan((), |_, (tag, event)| {
                    future::ready(match event {
                        Ok(event) => Some(event),
                        Err(error) => {
                            warn!(%tag, %error, "Transport discovery failed");
                            None
                        }
                    })
                })
                .boxed()
        });

        stream::select_all(streams).boxed()
    }

    /// Open a device through the provider that minted its id.
    ///
    /// Only the first provider whose tag matches is asked. When debug mode
    /// is on, the connection comes back with exchange tracing enabled.
    ///
    /// # Errors
    ///
    /// Returns `TransportNotFound` if no provider claims the id, otherwise
    /// whatever the owning provider's `open` failed with.
    pub async fn open(&self, id: &DeviceId) -> Result<AnyConnection> {
        let Some(provider) = self.providers.iter().find(|provider| provider.owns(id)) else {
            debug!(device = %id, "No provider for device");
            return Err(TransportError::not_found(id));
        };

        debug!(device = %id, tag = provider.tag(), "Dispatching open");
        let mut connection = provider
            .open(id)
            .await?
            .ok_or_else(|| TransportError::not_found(id))?;

        if debug::debug_mode() {
            connection.set_debug_mode(true);
        }
        Ok(connection)
    }
}
