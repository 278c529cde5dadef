//! Cloneable handle for opening devices.
//!
//! Job steps receive a [`DeviceOpener`] instead of the registry itself, so
//! they can be built before the registry is shared and cloned into every
//! spawned task.

use crate::Result;
use crate::providers::AnyConnection;
use crate::registry::TransportRegistry;
use devlink_core::DeviceId;
use std::sync::Arc;
use tracing::debug;

/// Opens devices through a shared [`TransportRegistry`].
#[derive(Debug, Clone)]
pub struct DeviceOpener {
    registry: Arc<TransportRegistry>,
}

impl DeviceOpener {
    pub fn new(registry: Arc<TransportRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TransportRegistry {
        &self.registry
    }

    /// Open the device with this id.
    ///
    /// # Errors
    ///
    /// Returns `TransportNotFound` if no provider claims the id, or the
    /// owning provider's open failure.
    pub async fn open(&self, id: &DeviceId) -> Result<AnyConnection> {
        debug!(device = %id, "Opening device");
        match self.registry.open(id).await {
            Ok(connection) => {
                debug!(device = %id, "Device opened");
                Ok(connection)
            }
            Err(error) => {
                debug!(device = %id, %error, "Device open failed");
                Err(error)
            }
        }
    }
}

impl From<TransportRegistry> for DeviceOpener {
    fn from(registry: TransportRegistry) -> Self {
        Self::new(Arc::new(registry))
    }
}
