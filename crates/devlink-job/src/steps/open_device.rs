//! Step that opens the device and checks that it answers.

use crate::step::{CompletionSignal, Step, StepStream, once};
use devlink_core::{DeviceId, Meta};
use devlink_transport::{DeviceConnection, DeviceOpener};
use tracing::debug;

/// "Get app and version", answered by any device in any state.
pub const GET_APP_AND_VERSION: [u8; 4] = [0xB0, 0x01, 0x00, 0x00];

/// Opens the device, exchanges a probe APDU and closes the connection.
///
/// Adds to the meta:
/// - `probe_response`: the reply, hex encoded
/// - `transport`: the tag of the provider that opened the device
#[derive(Debug, Clone)]
pub struct OpenDevice {
    opener: DeviceOpener,
    probe: Vec<u8>,
}

impl OpenDevice {
    pub fn new(opener: DeviceOpener) -> Self {
        Self {
            opener,
            probe: GET_APP_AND_VERSION.to_vec(),
        }
    }

    /// Use `apdu` as the probe instead of "get app and version".
    pub fn with_probe(mut self, apdu: impl Into<Vec<u8>>) -> Self {
        self.probe = apdu.into();
        self
    }
}

impl Step for OpenDevice {
    fn name(&self) -> &str {
        "open-device"
    }

    fn run(&self, device_id: &DeviceId, meta: Meta, _completion: CompletionSignal) -> StepStream {
        let opener = self.opener.clone();
        let probe = self.probe.clone();
        let device_id = device_id.clone();

        once(async move {
            let mut connection = opener.open(&device_id).await?;
            let reply = connection.exchange(&probe).await;
            let closed = connection.close().await;
            let reply = reply?;
            closed?;

            debug!(device = %device_id, reply = %hex::encode(&reply), "Device answered probe");
            let transport = device_id.tag().unwrap_or_default().to_string();
            Ok(meta
                .with("probe_response", hex::encode(&reply))
                .with("transport", transport))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;
    use devlink_transport::mock::MockTransport;
    use devlink_transport::{TransportError, TransportRegistry};
    use futures::StreamExt;
    use tokio::sync::broadcast;

    fn signal() -> CompletionSignal {
        let (sender, _) = broadcast::channel(4);
        CompletionSignal::new(0, &sender)
    }

    #[tokio::test]
    async fn test_probe_reply_is_recorded() {
        let (mock, handle) = MockTransport::new("mock");
        let id = handle.add_device("nano", "Nano S").unwrap();
        handle.push_response(vec![0x01, 0x05, 0x90, 0x00]);
        let opener = DeviceOpener::from(TransportRegistry::builder().register(mock).unwrap().build());

        let step = OpenDevice::new(opener);
        let meta = step.run(&id, Meta::new(), signal()).next().await.unwrap().unwrap();

        assert_eq!(meta.get_as::<String>("probe_response").as_deref(), Some("01059000"));
        assert_eq!(meta.get_as::<String>("transport").as_deref(), Some("mock"));
        assert_eq!(handle.exchanges(), vec![GET_APP_AND_VERSION.to_vec()]);
        assert_eq!(handle.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_custom_probe() {
        let (mock, handle) = MockTransport::new("mock");
        let id = handle.add_device("nano", "Nano S").unwrap();
        let opener = DeviceOpener::from(TransportRegistry::builder().register(mock).unwrap().build());

        let step = OpenDevice::new(opener).with_probe([0xE0, 0xC4, 0x00, 0x00]);
        step.run(&id, Meta::new(), signal()).next().await.unwrap().unwrap();
        assert_eq!(handle.exchanges(), vec![vec![0xE0, 0xC4, 0x00, 0x00]]);
    }

    #[tokio::test]
    async fn test_unknown_transport_fails_the_step() {
        let opener = DeviceOpener::from(TransportRegistry::default());
        let id: DeviceId = "usb|{}".parse().unwrap();

        let result = OpenDevice::new(opener).run(&id, Meta::new(), signal()).next().await.unwrap();
        match result {
            Err(StepError::Transport(error)) => {
                assert!(matches!(*error, TransportError::TransportNotFound { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
