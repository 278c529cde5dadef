use crate::{Result, constants::TAG_SEPARATOR, error::Error};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;

/// Self-describing device identifier.
///
/// A device id is opaque to callers but is built by its provider as
/// `<tag>|<payload>`, where the payload carries the native descriptor.
/// The same id can therefore be resolved back to a connection without any
/// external lookup state.
///
/// # Examples
///
/// ```
/// use devlink_core::DeviceId;
///
/// let id = DeviceId::tagged("httpdebug", "http://localhost:8435").unwrap();
/// assert_eq!(id.tag(), Some("httpdebug"));
/// assert_eq!(id.payload(), "http://localhost:8435");
/// assert!(id.has_tag("httpdebug"));
/// assert!(!id.has_tag("usb"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Wrap a raw id string.
    ///
    /// # Errors
    /// Returns `Error::InvalidDeviceId` if the id is empty.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::InvalidDeviceId("device id must not be empty".to_string()));
        }
        Ok(DeviceId(raw))
    }

    /// Build an id from a provider tag and a raw text payload.
    ///
    /// # Errors
    /// Returns `Error::InvalidDeviceId` if the tag is empty or contains the
    /// separator.
    pub fn tagged(tag: &str, payload: &str) -> Result<Self> {
        if tag.is_empty() || tag.contains(TAG_SEPARATOR) {
            return Err(Error::InvalidDeviceId(format!("invalid provider tag: {tag:?}")));
        }
        Ok(DeviceId(format!("{tag}{TAG_SEPARATOR}{payload}")))
    }

    /// Build an id from a provider tag and a serializable native descriptor.
    ///
    /// # Errors
    /// Returns an error if the tag is invalid or the descriptor cannot be
    /// serialized.
    pub fn tagged_json<T: Serialize>(tag: &str, native: &T) -> Result<Self> {
        let payload = serde_json::to_string(native)?;
        Self::tagged(tag, &payload)
    }

    /// The provider tag, if the id carries one.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.0.split_once(TAG_SEPARATOR).map(|(tag, _)| tag)
    }

    /// The payload following the tag, or the whole id if it is untagged.
    #[must_use]
    pub fn payload(&self) -> &str {
        self.0
            .split_once(TAG_SEPARATOR)
            .map_or(self.0.as_str(), |(_, payload)| payload)
    }

    /// Check whether the id was produced by the provider with this tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag() == Some(tag)
    }

    /// Decode a JSON payload back into the provider's native descriptor.
    ///
    /// # Errors
    /// Returns `Error::InvalidDescriptor` if the payload is not valid JSON for `T`.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(self.payload()).map_err(|e| Error::InvalidDescriptor {
            id: self.0.clone(),
            message: e.to_string(),
        })
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DeviceId::new(s)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Physical transport a device was discovered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// USB HID.
    Usb,

    /// Bluetooth Low Energy.
    Bluetooth,

    /// Development HTTP proxy forwarding APDUs to a device or simulator.
    HttpDebug,

    /// In-process mock transport.
    Mock,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usb => write!(f, "USB"),
            Self::Bluetooth => write!(f, "Bluetooth"),
            Self::HttpDebug => write!(f, "HTTP debug"),
            Self::Mock => write!(f, "Mock"),
        }
    }
}

/// Canonical description of a discovered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Self-describing id, resolvable by the provider that built it.
    pub id: DeviceId,

    /// Human readable name.
    pub name: String,

    /// Transport the device was seen on.
    pub kind: TransportKind,
}

impl DeviceDescriptor {
    pub fn new(id: DeviceId, name: impl Into<String>, kind: TransportKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
        }
    }
}

/// A change in the set of visible devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "descriptor", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    /// A device became reachable.
    Added(DeviceDescriptor),

    /// A device is no longer reachable.
    Removed(DeviceDescriptor),
}

impl DiscoveryEvent {
    /// The descriptor carried by the event.
    #[must_use]
    pub fn descriptor(&self) -> &DeviceDescriptor {
        match self {
            Self::Added(descriptor) | Self::Removed(descriptor) => descriptor,
        }
    }

    #[must_use]
    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added(_))
    }
}
