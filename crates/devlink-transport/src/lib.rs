//! Transport layer for devlink.
//!
//! This crate discovers devices across several physical transports and opens
//! connections to them through a single entry point, the
//! [`TransportRegistry`]. Each transport is a [`TransportProvider`] that mints
//! self-describing device ids, so any id handed out by discovery can later be
//! routed back to its owner without a lookup table.
//!
//! # Design Philosophy
//!
//! - **Async-first**: Providers and connections use native `async fn` in
//!   traits (Rust 1.90 + Edition 2024 RPITIT).
//! - **Enum dispatch**: The registry stores [`AnyTransportProvider`] values,
//!   keeping futures `Send` without boxing.
//! - **Isolation**: A provider whose discovery fails is logged and dropped
//!   from the merged stream while the others keep running.
//!
//! # Discovery
//!
//! ```no_run
//! use devlink_transport::mock::MockTransport;
//! use devlink_transport::TransportRegistry;
//! use futures::StreamExt;
//!
//! # async fn example() -> devlink_transport::Result<()> {
//! let (mock, handle) = MockTransport::new("mock");
//! handle.add_device("nano", "Nano S")?;
//!
//! let registry = TransportRegistry::builder().register(mock)?.build();
//! let mut events = registry.discover_all();
//! while let Some(event) = events.next().await {
//!     println!("{} {}", event.descriptor().id, event.descriptor().name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Opening
//!
//! ```no_run
//! use devlink_transport::traits::DeviceConnection;
//! use devlink_transport::TransportRegistry;
//! use devlink_core::DeviceId;
//!
//! # async fn example(registry: TransportRegistry, id: DeviceId) -> devlink_transport::Result<()> {
//! let mut connection = registry.open(&id).await?;
//! let reply = connection.exchange(&[0xE0, 0x01, 0x00, 0x00]).await?;
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Hardware
//!
//! The USB HID provider is behind the `hardware-hid` feature. The HTTP debug
//! provider is always available and is enabled at runtime by
//! `DEVLINK_DEBUG_HTTP_PROXY`.
//!
//! [`TransportProvider`]: traits::TransportProvider

pub mod debug;
pub mod error;
pub mod mock;
pub mod opener;
pub mod providers;
pub mod registry;
pub mod session;
pub mod traits;

pub use error::{Result, TransportError};
pub use opener::DeviceOpener;
pub use providers::{AnyConnection, AnyTransportProvider};
pub use registry::{RegistryBuilder, TransportRegistry};
pub use session::{DiscoverySession, SeenDevice};
pub use traits::{DeviceConnection, NativeDescriptor, Sighting, SightingKind, TransportProvider};
