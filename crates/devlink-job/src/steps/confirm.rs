//! Step that waits for the caller's confirmation.

use crate::step::{CompletionSignal, Step, StepStream, once};
use devlink_core::{DeviceId, Meta};
use tracing::debug;

/// Waits for the completion signal, then sets `key` to `true` in the meta.
///
/// This is the step a UI uses for "confirm on your device, then press
/// continue": the job only moves on once the caller notifies completion.
#[derive(Debug, Clone)]
pub struct AwaitConfirmation {
    key: String,
}

impl AwaitConfirmation {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Step for AwaitConfirmation {
    fn name(&self) -> &str {
        "await-confirmation"
    }

    fn run(&self, device_id: &DeviceId, meta: Meta, mut completion: CompletionSignal) -> StepStream {
        let key = self.key.clone();
        let device = device_id.clone();
        once(async move {
            debug!(device = %device, index = completion.index(), "Waiting for confirmation");
            completion.wait().await?;
            Ok(meta.with(key, true))
        })
    }
}
