//! Error types for transport operations.
//!
//! This module defines the failures that can occur while discovering,
//! opening and talking to devices. Provider-level discovery failures never
//! escape the registry; open and exchange failures are surfaced to callers.

use devlink_core::DeviceId;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No registered provider claims the device id.
    #[error("Can't find handler to open {id}")]
    TransportNotFound { id: DeviceId },

    /// A provider's discovery stream failed; isolated to that provider.
    #[error("Transport provider {tag} failed: {message}")]
    ProviderDiscoveryFailure { tag: String, message: String },

    /// The owning provider could not open the device.
    #[error("Failed to open {id}: {message}")]
    OpenFailed { id: DeviceId, message: String },

    /// Device communication error.
    #[error("Communication error: {message}")]
    Communication { message: String },

    /// Device is not connected or has been disconnected.
    #[error("Device {device} was disconnected")]
    Disconnected { device: String },

    /// Two providers were registered with the same tag.
    #[error("A provider with tag {tag} is already registered")]
    DuplicateTag { tag: String },

    /// The device answered with something that could not be decoded.
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// Addressing or descriptor error from the data model.
    #[error(transparent)]
    Core(#[from] devlink_core::Error),

    /// HTTP error from the debug proxy transport.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// Create a new transport-not-found error.
    pub fn not_found(id: &DeviceId) -> Self {
        Self::TransportNotFound { id: id.clone() }
    }

    /// Create a new discovery failure for the provider with this tag.
    pub fn discovery_failure(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderDiscoveryFailure {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// Create a new open failure.
    pub fn open_failed(id: &DeviceId, message: impl Into<String>) -> Self {
        Self::OpenFailed {
            id: id.clone(),
            message: message.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}
