//! USB HID transport backed by `hidapi`.
//!
//! Discovery polls the HID enumeration on a blocking thread and diffs it
//! against the previous snapshot, so plugging and unplugging a device shows
//! up as `Add` and `Remove` sightings. The device id payload is the JSON form
//! of [`HidDescriptor`], which is everything `open` needs to find the device
//! again.
//!
//! `hidapi` calls block, so every call runs under `spawn_blocking`. An
//! exchange that is waiting for the user to confirm on the device keeps its
//! blocking thread until the device answers, even if the caller gave up.

use super::framing::{Unwrapper, wrap_apdu};
use crate::{
    Result, TransportError,
    providers::AnyConnection,
    traits::{DeviceConnection, NativeDescriptor, Sighting, TransportProvider},
};
use bytes::Bytes;
use devlink_core::constants::{HID_CHANNEL, HID_PACKET_SIZE, USB_TAG};
use devlink_core::{DeviceId, LinkConfig, TransportKind};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use hidapi::{HidApi, HidDevice};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// HID usage page of the APDU interface.
const APDU_USAGE_PAGE: u16 = 0xffa0;

/// Native descriptor of a HID device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HidDescriptor {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Shared `hidapi` context, created on first use.
#[derive(Clone, Default)]
struct HidContext(Arc<Mutex<Option<HidApi>>>);

impl fmt::Debug for HidContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HidContext")
            .field("initialized", &self.lock().is_some())
            .finish()
    }
}

impl HidContext {
    fn lock(&self) -> MutexGuard<'_, Option<HidApi>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against an initialized `hidapi` context on a blocking thread.
    async fn with_api<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut HidApi) -> Result<T> + Send + 'static,
    {
        let context = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = context.lock();
            if guard.is_none() {
                *guard = Some(HidApi::new().map_err(hid_error)?);
            }
            match guard.as_mut() {
                Some(api) => f(api),
                None => Err(TransportError::communication("HID context unavailable")),
            }
        })
        .await
        .map_err(|error| TransportError::communication(format!("HID task failed: {error}")))?
    }
}

fn hid_error(error: hidapi::HidError) -> TransportError {
    TransportError::communication(error.to_string())
}

/// Provider for USB HID devices of one vendor.
#[derive(Debug, Clone)]
pub struct HidProvider {
    vendor_id: u16,
    poll_interval: Duration,
    context: HidContext,
}

impl HidProvider {
    pub fn new(vendor_id: u16, poll_interval: Duration) -> Self {
        Self {
            vendor_id,
            poll_interval,
            context: HidContext::default(),
        }
    }

    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(config.hid_vendor_id, config.hid_poll_interval())
    }

    /// Snapshot of the matching devices, keyed by path.
    async fn enumerate(&self) -> Result<BTreeMap<String, (String, HidDescriptor)>> {
        let vendor_id = self.vendor_id;
        self.context
            .with_api(move |api| {
                api.refresh_devices().map_err(hid_error)?;
                let devices = api
                    .device_list()
                    .filter(|info| info.vendor_id() == vendor_id)
                    .filter(|info| {
                        info.usage_page() == APDU_USAGE_PAGE || info.interface_number() == 0
                    })
                    .filter_map(|info| {
                        let descriptor = HidDescriptor {
                            path: device_path(info.path())?,
                            vendor_id: info.vendor_id(),
                            product_id: info.product_id(),
                        };
                        let name = info.product_string().map_or_else(
                            || format!("USB {:04x}:{:04x}", info.vendor_id(), info.product_id()),
                            str::to_string,
                        );
                        Some((descriptor.path.clone(), (name, descriptor)))
                    })
                    .collect();
                Ok(devices)
            })
            .await
    }
}

/// The path as stored in device ids. Paths that are not UTF-8 could not be
/// reopened from the id, so those devices are skipped.
fn device_path(path: &CStr) -> Option<String> {
    match path.to_str() {
        Ok(path) => Some(path.to_string()),
        Err(_) => {
            warn!(path = ?path, "Skipping HID device with a non UTF-8 path");
            None
        }
    }
}

fn sighting(add: bool, name: String, descriptor: &HidDescriptor) -> Result<Sighting> {
    let value = serde_json::to_value(descriptor).map_err(devlink_core::Error::from)?;
    let native = NativeDescriptor::Json(value);
    Ok(if add {
        Sighting::added(name, native)
    } else {
        Sighting::removed(name, native)
    })
}

/// Polling state threaded through the discovery stream.
struct Poll {
    provider: HidProvider,
    known: BTreeMap<String, (String, HidDescriptor)>,
    first: bool,
}

impl TransportProvider for HidProvider {
    fn tag(&self) -> &str {
        USB_TAG
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Usb
    }

    fn discover(&self) -> BoxStream<'static, Result<Sighting>> {
        let initial = Poll {
            provider: self.clone(),
            known: BTreeMap::new(),
            first: true,
        };

        stream::unfold(Some(initial), |poll| async move {
            let mut poll = poll?;
            if !poll.first {
                tokio::time::sleep(poll.provider.poll_interval).await;
            }
            poll.first = false;

            let current = match poll.provider.enumerate().await {
                Ok(current) => current,
                Err(error) => return Some((vec![Err(error)], None)),
            };

            let mut batch = Vec::new();
            for (path, (name, descriptor)) in &poll.known {
                if !current.contains_key(path) {
                    debug!(%path, "HID device removed");
                    batch.push(sighting(false, name.clone(), descriptor));
                }
            }
            for (path, (name, descriptor)) in &current {
                if !poll.known.contains_key(path) {
                    debug!(%path, "HID device added");
                    batch.push(sighting(true, name.clone(), descriptor));
                }
            }
            poll.known = current;

            Some((batch, Some(poll)))
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn open(&self, id: &DeviceId) -> Result<Option<AnyConnection>> {
        if !self.owns(id) {
            return Ok(None);
        }

        let descriptor: HidDescriptor = id.decode_json()?;
        let path = CString::new(descriptor.path.clone())
            .map_err(|_| TransportError::open_failed(id, "HID path contains a NUL byte"))?;

        let device = self
            .context
            .with_api(move |api| api.open_path(&path).map_err(hid_error))
            .await
            .map_err(|error| {
                warn!(device = %id, %error, "HID open failed");
                TransportError::open_failed(id, error.to_string())
            })?;

        debug!(path = %descriptor.path, "HID device opened");
        Ok(Some(AnyConnection::Hid(HidConnection {
            id: id.clone(),
            device: Some(Arc::new(Mutex::new(device))),
            debug: false,
        })))
    }
}

/// Open HID device.
pub struct HidConnection {
    id: DeviceId,
    device: Option<Arc<Mutex<HidDevice>>>,
    debug: bool,
}

impl fmt::Debug for HidConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HidConnection")
            .field("id", &self.id)
            .field("open", &self.device.is_some())
            .field("debug", &self.debug)
            .finish()
    }
}

impl DeviceConnection for HidConnection {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    async fn exchange(&mut self, apdu: &[u8]) -> Result<Bytes> {
        let Some(device) = self.device.clone() else {
            return Err(TransportError::disconnected(self.id.to_string()));
        };
        let packets = wrap_apdu(HID_CHANNEL, apdu, HID_PACKET_SIZE)?;
        let device_name = self.id.to_string();

        tokio::task::spawn_blocking(move || {
            let device = device.lock().unwrap_or_else(PoisonError::into_inner);

            for packet in packets {
                // Report id 0 precedes every report on the wire.
                let mut report = Vec::with_capacity(packet.len() + 1);
                report.push(0x00);
                report.extend_from_slice(&packet);
                device
                    .write(&report)
                    .map_err(|_| TransportError::disconnected(device_name.clone()))?;
            }

            let mut unwrapper = Unwrapper::new(HID_CHANNEL);
            let mut buffer = [0u8; HID_PACKET_SIZE];
            loop {
                let read = device
                    .read(&mut buffer)
                    .map_err(|_| TransportError::disconnected(device_name.clone()))?;
                if let Some(reply) = unwrapper.push(&buffer[..read])? {
                    return Ok(reply);
                }
            }
        })
        .await
        .map_err(|error| TransportError::communication(format!("HID task failed: {error}")))?
    }

    fn set_debug_mode(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    fn debug_mode(&self) -> bool {
        self.debug
    }

    async fn close(&mut self) -> Result<()> {
        self.device = None;
        Ok(())
    }
}
