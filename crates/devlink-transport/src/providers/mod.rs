//! Enum wrappers for provider and connection dispatch.
//!
//! Native `async fn` in traits (RPITIT - Rust Edition 2024) are not
//! object-safe, so the registry cannot hold `Box<dyn TransportProvider>`.
//! Instead every backend gets a variant here, and the wrappers forward each
//! trait method to the concrete type.
//!
//! This approach provides:
//! - Zero-cost abstraction (monomorphization at compile-time)
//! - `Send` futures without boxing, so callers can spawn them
//! - Support for feature flags (hardware backends are conditional)
//!
//! # Examples
//!
//! ```
//! use devlink_transport::mock::MockTransport;
//! use devlink_transport::providers::AnyTransportProvider;
//! use devlink_transport::traits::TransportProvider;
//!
//! let (mock, _handle) = MockTransport::new("mock");
//! let provider = AnyTransportProvider::from(mock);
//! assert_eq!(provider.tag(), "mock");
//! ```

pub mod framing;
pub mod http_debug;

#[cfg(feature = "hardware-hid")]
pub mod hid;

use crate::Result;
use crate::mock::{MockConnection, MockTransport};
use crate::traits::{DeviceConnection, Sighting, TransportProvider};
use bytes::Bytes;
use devlink_core::{DeviceId, TransportKind};
use futures::stream::BoxStream;
use tracing::debug;

pub use http_debug::{HttpDebugConnection, HttpDebugProvider};

#[cfg(feature = "hardware-hid")]
pub use hid::{HidConnection, HidProvider};

/// Enum wrapper for transport provider dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTransportProvider {
    /// In-process provider for development and tests.
    Mock(MockTransport),

    /// Development HTTP proxy.
    HttpDebug(HttpDebugProvider),

    /// USB HID devices.
    #[cfg(feature = "hardware-hid")]
    Hid(HidProvider),
}

impl TransportProvider for AnyTransportProvider {
    fn tag(&self) -> &str {
        match self {
            Self::Mock(provider) => provider.tag(),
            Self::HttpDebug(provider) => provider.tag(),
            #[cfg(feature = "hardware-hid")]
            Self::Hid(provider) => provider.tag(),
        }
    }

    fn kind(&self) -> TransportKind {
        match self {
            Self::Mock(provider) => provider.kind(),
            Self::HttpDebug(provider) => provider.kind(),
            #[cfg(feature = "hardware-hid")]
            Self::Hid(provider) => provider.kind(),
        }
    }

    fn discover(&self) -> BoxStream<'static, Result<Sighting>> {
        match self {
            Self::Mock(provider) => provider.discover(),
            Self::HttpDebug(provider) => provider.discover(),
            #[cfg(feature = "hardware-hid")]
            Self::Hid(provider) => provider.discover(),
        }
    }

    async fn open(&self, id: &DeviceId) -> Result<Option<AnyConnection>> {
        match self {
            Self::Mock(provider) => provider.open(id).await,
            Self::HttpDebug(provider) => provider.open(id).await,
            #[cfg(feature = "hardware-hid")]
            Self::Hid(provider) => provider.open(id).await,
        }
    }
}

impl From<MockTransport> for AnyTransportProvider {
    fn from(provider: MockTransport) -> Self {
        Self::Mock(provider)
    }
}

impl From<HttpDebugProvider> for AnyTransportProvider {
    fn from(provider: HttpDebugProvider) -> Self {
        Self::HttpDebug(provider)
    }
}

#[cfg(feature = "hardware-hid")]
impl From<HidProvider> for AnyTransportProvider {
    fn from(provider: HidProvider) -> Self {
        Self::Hid(provider)
    }
}

/// Enum wrapper for open connections.
///
/// Besides dispatching, the wrapper owns the debug-mode tracing: when debug
/// mode is on, every exchange is logged in hex on the way out and back.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyConnection {
    Mock(MockConnection),
    HttpDebug(HttpDebugConnection),
    #[cfg(feature = "hardware-hid")]
    Hid(HidConnection),
}

impl DeviceConnection for AnyConnection {
    fn id(&self) -> &DeviceId {
        match self {
            Self::Mock(connection) => connection.id(),
            Self::HttpDebug(connection) => connection.id(),
            #[cfg(feature = "hardware-hid")]
            Self::Hid(connection) => connection.id(),
        }
    }

    async fn exchange(&mut self, apdu: &[u8]) -> Result<Bytes> {
        let traced = self.debug_mode();
        if traced {
            debug!(device = %self.id(), apdu = %hex::encode(apdu), "=>");
        }

        let reply = match self {
            Self::Mock(connection) => connection.exchange(apdu).await,
            Self::HttpDebug(connection) => connection.exchange(apdu).await,
            #[cfg(feature = "hardware-hid")]
            Self::Hid(connection) => connection.exchange(apdu).await,
        }?;

        if traced {
            debug!(device = %self.id(), reply = %hex::encode(&reply), "<=");
        }
        Ok(reply)
    }

    fn set_debug_mode(&mut self, enabled: bool) {
        match self {
            Self::Mock(connection) => connection.set_debug_mode(enabled),
            Self::HttpDebug(connection) => connection.set_debug_mode(enabled),
            #[cfg(feature = "hardware-hid")]
            Self::Hid(connection) => connection.set_debug_mode(enabled),
        }
    }

    fn debug_mode(&self) -> bool {
        match self {
            Self::Mock(connection) => connection.debug_mode(),
            Self::HttpDebug(connection) => connection.debug_mode(),
            #[cfg(feature = "hardware-hid")]
            Self::Hid(connection) => connection.debug_mode(),
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Mock(connection) => connection.close().await,
            Self::HttpDebug(connection) => connection.close().await,
            #[cfg(feature = "hardware-hid")]
            Self::Hid(connection) => connection.close().await,
        }
    }
}
