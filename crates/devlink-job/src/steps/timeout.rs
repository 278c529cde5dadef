//! Time limit for a step.

use crate::error::StepError;
use crate::step::{CompletionSignal, Step, StepStream};
use devlink_core::{DeviceId, Meta};
use futures::StreamExt;
use futures::stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

/// Fails the wrapped step with `StepError::Timeout` if its stream has not
/// ended within `duration` of the step starting.
#[derive(Clone)]
pub struct WithTimeout {
    inner: Arc<dyn Step>,
    duration: Duration,
    name: String,
}

impl std::fmt::Debug for WithTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WithTimeout")
            .field("inner", &self.inner.name())
            .field("duration", &self.duration)
            .finish()
    }
}

impl WithTimeout {
    pub fn new(inner: impl Step + 'static, duration: Duration) -> Self {
        let name = format!("{} (timeout {:?})", inner.name(), duration);
        Self {
            inner: Arc::new(inner),
            duration,
            name,
        }
    }
}

impl Step for WithTimeout {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, device_id: &DeviceId, meta: Meta, completion: CompletionSignal) -> StepStream {
        let inner = self.inner.run(device_id, meta, completion);
        let deadline = Instant::now() + self.duration;
        let duration_ms = u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX);

        stream::unfold(Some(inner), move |inner| async move {
            let mut inner = inner?;
            match timeout_at(deadline, inner.next()).await {
                Ok(Some(item)) => Some((item, Some(inner))),
                Ok(None) => None,
                Err(_) => Some((Err(StepError::Timeout { duration_ms }), None)),
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::once;
    use crate::steps::{AwaitConfirmation, FnStep};
    use tokio::sync::broadcast;

    fn signal(sender: &broadcast::Sender<crate::step::CompletionEvent>) -> CompletionSignal {
        CompletionSignal::new(0, sender)
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_step_times_out() {
        let (sender, _) = broadcast::channel(4);
        let step = WithTimeout::new(AwaitConfirmation::new("confirmed"), Duration::from_secs(30));
        let id: DeviceId = "mock|nano".parse().unwrap();

        let items: Vec<_> = step.run(&id, Meta::new(), signal(&sender)).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(StepError::Timeout { duration_ms: 30_000 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_step_passes_through() {
        let (sender, _) = broadcast::channel(4);
        let inner = FnStep::new("fast", |_: &DeviceId, meta: Meta, _| {
            once(async move { Ok(meta.with("fast", true)) })
        });
        let step = WithTimeout::new(inner, Duration::from_secs(1));
        let id: DeviceId = "mock|nano".parse().unwrap();

        let items: Vec<_> = step.run(&id, Meta::new(), signal(&sender)).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap().contains_key("fast"));
        assert!(step.name().starts_with("fast"));
    }
}
