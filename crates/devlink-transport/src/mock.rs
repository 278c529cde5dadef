//! Mock transport implementation for testing and development.
//!
//! This module provides a simulated transport provider that can be
//! controlled programmatically: devices appear and disappear on demand,
//! discovery and open failures can be injected, and device replies can be
//! scripted. It never matches real hardware, which makes it suitable for
//! exercising the registry and the job engine in isolation.

use crate::{
    Result, TransportError,
    providers::AnyConnection,
    traits::{DeviceConnection, NativeDescriptor, Sighting, TransportProvider},
};
use bytes::Bytes;
use devlink_core::{DeviceId, TransportKind};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Status word returned when no reply has been scripted.
const DEFAULT_REPLY: [u8; 2] = [0x90, 0x00];

/// Mock transport provider.
///
/// # Examples
///
/// ```
/// use devlink_transport::mock::MockTransport;
/// use devlink_transport::traits::{DeviceConnection, TransportProvider};
///
/// #[tokio::main]
/// async fn main() -> devlink_transport::Result<()> {
///     let (provider, handle) = MockTransport::new("mock");
///     let id = handle.add_device("nano", "Nano S")?;
///     handle.push_response(vec![0x90, 0x00]);
///
///     let mut connection = provider.open(&id).await?.expect("owned by mock");
///     let reply = connection.exchange(&[0xE0, 0x01, 0x00, 0x00]).await?;
///     assert_eq!(reply.as_ref(), &[0x90, 0x00]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTransport {
    tag: String,
    shared: Shared,
}

/// Handle for controlling a mock transport.
///
/// Clones share the same simulated backend.
#[derive(Debug, Clone)]
pub struct MockTransportHandle {
    tag: String,
    shared: Shared,
}

#[derive(Debug, Clone)]
struct Shared {
    state: Arc<Mutex<MockState>>,
    signals: broadcast::Sender<Signal>,
}

#[derive(Debug, Default)]
struct MockState {
    /// Visible devices as (key, name), in insertion order.
    devices: Vec<(String, String)>,

    /// Failure returned by every discovery stream started from now on.
    discovery_failure: Option<String>,

    /// Failure returned by the next open.
    next_open_failure: Option<String>,

    /// Scripted replies, consumed in order.
    responses: VecDeque<Vec<u8>>,

    /// Every APDU received by any connection.
    exchanges: Vec<Vec<u8>>,

    open_calls: usize,
    open_connections: usize,
    last_debug_mode: Option<bool>,
}

#[derive(Debug, Clone)]
enum Signal {
    Sighting(Sighting),
    Fail(String),
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MockTransport {
    /// Create a new mock provider with the given tag.
    ///
    /// Returns a tuple of (MockTransport, MockTransportHandle) where the
    /// handle can be used to drive the simulated backend.
    pub fn new(tag: impl Into<String>) -> (Self, MockTransportHandle) {
        let tag = tag.into();
        let (signals, _) = broadcast::channel(64);
        let shared = Shared {
            state: Arc::new(Mutex::new(MockState::default())),
            signals,
        };

        let provider = Self {
            tag: tag.clone(),
            shared: shared.clone(),
        };
        let handle = MockTransportHandle { tag, shared };

        (provider, handle)
    }
}

impl TransportProvider for MockTransport {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Mock
    }

    fn discover(&self) -> BoxStream<'static, Result<Sighting>> {
        // Subscribe before taking the snapshot so nothing added in between is lost.
        let receiver = self.shared.signals.subscribe();
        let (snapshot, failure) = {
            let state = self.shared.lock();
            let snapshot: Vec<Result<Sighting>> = state
                .devices
                .iter()
                .map(|(key, name)| {
                    Ok(Sighting::added(
                        name.clone(),
                        NativeDescriptor::Text(key.clone()),
                    ))
                })
                .collect();
            (snapshot, state.discovery_failure.clone())
        };

        let tag = self.tag.clone();
        if let Some(message) = failure {
            let failed = stream::once(async move { Err(TransportError::discovery_failure(tag, message)) });
            return stream::iter(snapshot).chain(failed).boxed();
        }

        let updates = stream::unfold(Some(receiver), move |receiver| {
            let tag = tag.clone();
            async move {
                let mut receiver = receiver?;
                loop {
                    match receiver.recv().await {
                        Ok(Signal::Sighting(sighting)) => return Some((Ok(sighting), Some(receiver))),
                        Ok(Signal::Fail(message)) => {
                            return Some((Err(TransportError::discovery_failure(tag, message)), None));
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        stream::iter(snapshot).chain(updates).boxed()
    }

    async fn open(&self, id: &DeviceId) -> Result<Option<AnyConnection>> {
        if !self.owns(id) {
            return Ok(None);
        }

        let mut state = self.shared.lock();
        state.open_calls += 1;

        if let Some(message) = state.next_open_failure.take() {
            return Err(TransportError::open_failed(id, message));
        }
        if !state.devices.iter().any(|(key, _)| key == id.payload()) {
            return Err(TransportError::open_failed(id, "no such mock device"));
        }

        state.open_connections += 1;
        state.last_debug_mode = Some(false);
        Ok(Some(AnyConnection::Mock(MockConnection {
            id: id.clone(),
            shared: self.shared.clone(),
            debug: false,
            closed: false,
        })))
    }
}

impl MockTransportHandle {
    /// Make a device visible and return the id discovery will report for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider tag is not a valid id tag.
    pub fn add_device(&self, key: &str, name: &str) -> Result<DeviceId> {
        let id = self.device_id(key)?;
        self.shared
            .lock()
            .devices
            .push((key.to_string(), name.to_string()));
        let _ = self.shared.signals.send(Signal::Sighting(Sighting::added(
            name,
            NativeDescriptor::Text(key.to_string()),
        )));
        Ok(id)
    }

    /// Withdraw a device. Returns `false` if it was not visible.
    pub fn remove_device(&self, key: &str) -> bool {
        let removed = {
            let mut state = self.shared.lock();
            let position = state.devices.iter().position(|(k, _)| k == key);
            position.map(|index| state.devices.remove(index))
        };

        match removed {
            Some((key, name)) => {
                let _ = self
                    .shared
                    .signals
                    .send(Signal::Sighting(Sighting::removed(name, NativeDescriptor::Text(key))));
                true
            }
            None => false,
        }
    }

    /// Fail every running discovery stream and every stream started later.
    pub fn fail_discovery(&self, message: &str) {
        self.shared.lock().discovery_failure = Some(message.to_string());
        let _ = self.shared.signals.send(Signal::Fail(message.to_string()));
    }

    /// Make the next `open` on this provider fail.
    pub fn fail_next_open(&self, message: &str) {
        self.shared.lock().next_open_failure = Some(message.to_string());
    }

    /// Queue a reply for the next exchange.
    pub fn push_response(&self, reply: Vec<u8>) {
        self.shared.lock().responses.push_back(reply);
    }

    /// The id this provider mints for a device key.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider tag is not a valid id tag.
    pub fn device_id(&self, key: &str) -> Result<DeviceId> {
        Ok(DeviceId::tagged(&self.tag, key)?)
    }

    /// Number of `open` calls this provider received.
    pub fn open_calls(&self) -> usize {
        self.shared.lock().open_calls
    }

    /// Number of connections currently open.
    pub fn open_connections(&self) -> usize {
        self.shared.lock().open_connections
    }

    /// Debug flag of the most recently opened connection.
    pub fn last_debug_mode(&self) -> Option<bool> {
        self.shared.lock().last_debug_mode
    }

    /// Every APDU received so far.
    pub fn exchanges(&self) -> Vec<Vec<u8>> {
        self.shared.lock().exchanges.clone()
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// Connection to a mock device.
///
/// Replies come from the handle's script, falling back to `90 00`.
#[derive(Debug)]
pub struct MockConnection {
    id: DeviceId,
    shared: Shared,
    debug: bool,
    closed: bool,
}

impl MockConnection {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.shared.lock();
            state.open_connections = state.open_connections.saturating_sub(1);
        }
    }
}

impl DeviceConnection for MockConnection {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    async fn exchange(&mut self, apdu: &[u8]) -> Result<Bytes> {
        if self.closed {
            return Err(TransportError::disconnected(self.id.to_string()));
        }

        let mut state = self.shared.lock();
        state.exchanges.push(apdu.to_vec());
        let reply = state
            .responses
            .pop_front()
            .unwrap_or_else(|| DEFAULT_REPLY.to_vec());
        Ok(Bytes::from(reply))
    }

    fn set_debug_mode(&mut self, enabled: bool) {
        self.debug = enabled;
        self.shared.lock().last_debug_mode = Some(enabled);
    }

    fn debug_mode(&self) -> bool {
        self.debug
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.release();
    }
}
