//! The step contract.
//!
//! A step is one unit of device work in a job. It receives the device id,
//! the [`Meta`] accumulated by the steps before it and a [`CompletionSignal`]
//! filtered to its own index, and returns a stream of `Meta` values. The
//! stream's last value becomes the input of the next step.
//!
//! Steps are trait objects (`Arc<dyn Step>`), so the contract returns a
//! boxed stream instead of using `async fn`.

use crate::error::StepError;
use devlink_core::{DeviceId, Meta};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::future::Future;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Stream returned by [`Step::run`]. Only its last value is kept.
pub type StepStream = BoxStream<'static, Result<Meta, StepError>>;

/// One unit of work in a device job.
///
/// The stream must eventually yield at least one `Meta` and then end, or
/// fail. A step that waits for the user can wait on `completion`; one that
/// finishes by itself may ignore it.
pub trait Step: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn run(&self, device_id: &DeviceId, meta: Meta, completion: CompletionSignal) -> StepStream;
}

/// Stream yielding the output of a single future.
pub fn once<F>(future: F) -> StepStream
where
    F: Future<Output = Result<Meta, StepError>> + Send + 'static,
{
    stream::once(future).boxed()
}

/// "Step `index` is done", sent from outside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompletionEvent {
    pub index: usize,
}

/// A run's completion channel, seen from the step with this index.
///
/// The signal only observes events sent after it was created, and of those
/// only the ones carrying its own index.
#[derive(Debug)]
pub struct CompletionSignal {
    index: usize,
    receiver: broadcast::Receiver<CompletionEvent>,
    sender: broadcast::WeakSender<CompletionEvent>,
}

impl CompletionSignal {
    /// Subscribe to `sender` on behalf of step `index`.
    pub fn new(index: usize, sender: &broadcast::Sender<CompletionEvent>) -> Self {
        Self {
            index,
            receiver: sender.subscribe(),
            sender: sender.downgrade(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Wait for the completion of this step.
    ///
    /// # Errors
    ///
    /// Returns `StepError::CompletionClosed` if the run that owns the channel
    /// is gone.
    pub async fn wait(&mut self) -> Result<(), StepError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.index == self.index => return Ok(()),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return Err(StepError::CompletionClosed),
            }
        }
    }

    /// Mark this step as done, as if the caller had done it.
    pub fn notify(&self) {
        if let Some(sender) = self.sender.upgrade() {
            let _ = sender.send(CompletionEvent { index: self.index });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devlink_core::constants::COMPLETION_CHANNEL_CAPACITY;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_ignores_other_indices() {
        let (sender, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        let mut signal = CompletionSignal::new(1, &sender);

        sender.send(CompletionEvent { index: 0 }).unwrap();
        sender.send(CompletionEvent { index: 2 }).unwrap();
        let early = tokio::time::timeout(Duration::from_millis(20), signal.wait()).await;
        assert!(early.is_err());

        sender.send(CompletionEvent { index: 1 }).unwrap();
        signal.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_events_before_subscription_are_not_seen() {
        let (sender, _keep) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        sender.send(CompletionEvent { index: 0 }).unwrap();

        let mut signal = CompletionSignal::new(0, &sender);
        let early = tokio::time::timeout(Duration::from_millis(20), signal.wait()).await;
        assert!(early.is_err());
    }

    #[tokio::test]
    async fn test_notify_completes_own_wait() {
        let (sender, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        let mut signal = CompletionSignal::new(3, &sender);

        signal.notify();
        signal.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (sender, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        let mut signal = CompletionSignal::new(0, &sender);
        drop(sender);

        assert!(matches!(signal.wait().await, Err(StepError::CompletionClosed)));
        signal.notify();
    }
}
