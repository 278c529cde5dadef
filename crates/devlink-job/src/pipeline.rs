//! Sequential step pipeline.
//!
//! A [`StepPipeline`] is an ordered list of steps. Spawning it against a
//! device id starts a [`PipelineRun`]: a task that folds the steps one after
//! the other, threading the [`Meta`] produced by each into the next, and
//! reports progress as [`PipelineEvent`]s.
//!
//! # Execution
//!
//! ```text
//! meta = {}
//! for each step i:
//!     subscribe completion signal for i
//!     emit StepEntered { i, meta }
//!     meta = last value of step.run(device, meta, signal)
//! emit Completed { meta }
//! ```
//!
//! The first step error emits `Failed` and stops the run, and so does a step
//! that panics. Cancelling the run drops the active step stream immediately
//! and nothing further is emitted.

use crate::error::{JobError, StepError};
use crate::step::{CompletionEvent, CompletionSignal, Step};
use devlink_core::constants::COMPLETION_CHANNEL_CAPACITY;
use devlink_core::{DeviceId, Meta};
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Progress of a pipeline run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Step `index` is about to run with `meta` as input.
    StepEntered { index: usize, meta: Meta },

    /// Every step succeeded; `meta` is the output of the last one.
    Completed { meta: Meta },

    /// A step failed; `meta` is the input of the failed step.
    Failed { error: JobError, meta: Meta },
}

/// Ordered list of steps, cheap to clone.
#[derive(Clone, Default)]
pub struct StepPipeline {
    steps: Vec<Arc<dyn Step>>,
}

impl fmt::Debug for StepPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepPipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}

impl StepPipeline {
    pub fn new(steps: Vec<Arc<dyn Step>>) -> Self {
        Self { steps }
    }

    /// Append a step.
    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Start a run against `device_id` on the current Tokio runtime.
    pub fn spawn(&self, device_id: DeviceId) -> PipelineRun {
        let id = Uuid::new_v4();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (completion, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        let token = CancellationToken::new();

        let steps = self.steps.clone();
        let run_device = device_id.clone();
        let run_completion = completion.clone();
        let run_token = token.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = run_token.cancelled() => {
                    debug!(run = %id, "Pipeline run cancelled");
                }
                _ = drive(id, steps, run_device, events_tx, run_completion) => {}
            }
        });

        debug!(run = %id, device = %device_id, steps = self.steps.len(), "Pipeline run started");
        PipelineRun {
            id,
            device_id,
            events: events_rx,
            completion,
            token,
            task,
            joined: false,
            current: (0, Meta::new()),
        }
    }
}

async fn drive(
    id: Uuid,
    steps: Vec<Arc<dyn Step>>,
    device_id: DeviceId,
    events: mpsc::UnboundedSender<PipelineEvent>,
    completion: broadcast::Sender<CompletionEvent>,
) {
    let mut meta = Meta::new();

    for (index, step) in steps.iter().enumerate() {
        let signal = CompletionSignal::new(index, &completion);
        if events
            .send(PipelineEvent::StepEntered {
                index,
                meta: meta.clone(),
            })
            .is_err()
        {
            return;
        }

        debug!(run = %id, index, step = step.name(), "Entering step");
        let mut stream = step.run(&device_id, meta.clone(), signal);
        let mut last = None;
        let mut failure = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(value) => last = Some(value),
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }
        drop(stream);

        let failure = match (failure, last) {
            (Some(error), _) => error,
            (None, Some(value)) => {
                meta = value;
                continue;
            }
            (None, None) => StepError::NoOutput { index },
        };

        warn!(run = %id, index, step = step.name(), error = %failure, "Step failed");
        let _ = events.send(PipelineEvent::Failed {
            error: JobError::new(index, failure),
            meta,
        });
        return;
    }

    let _ = events.send(PipelineEvent::Completed { meta });
}

/// A running pipeline.
///
/// Dropping the run cancels it.
#[derive(Debug)]
pub struct PipelineRun {
    id: Uuid,
    device_id: DeviceId,
    events: mpsc::UnboundedReceiver<PipelineEvent>,
    completion: broadcast::Sender<CompletionEvent>,
    token: CancellationToken,
    task: JoinHandle<()>,
    joined: bool,
    /// Index and input of the last step entered.
    current: (usize, Meta),
}

impl PipelineRun {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Next progress event, or `None` once the run is over or cancelled.
    ///
    /// A step that panics ends the run with a `Failed` event for that step.
    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        if self.token.is_cancelled() || self.joined {
            return None;
        }

        match self.events.recv().await {
            Some(event) => {
                if let PipelineEvent::StepEntered { index, meta } = &event {
                    self.current = (*index, meta.clone());
                }
                Some(event)
            }
            None => self.join().await,
        }
    }

    /// Reap the driving task once its event channel has closed.
    async fn join(&mut self) -> Option<PipelineEvent> {
        self.joined = true;
        let error = (&mut self.task).await.err()?;
        if !error.is_panic() || self.token.is_cancelled() {
            return None;
        }

        let (index, meta) = std::mem::take(&mut self.current);
        warn!(run = %self.id, index, %error, "Step panicked");
        Some(PipelineEvent::Failed {
            error: JobError::new(index, StepError::failed(format!("step panicked: {error}"))),
            meta,
        })
    }

    /// Signal that step `index` is done. Only the current step reacts.
    pub fn notify(&self, index: usize) {
        let _ = self.completion.send(CompletionEvent { index });
    }

    /// Stop the run. The active step stream is dropped.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the driving task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PipelineRun {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{StepStream, once};
    use crate::steps::FnStep;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn device() -> DeviceId {
        "mock|nano".parse().unwrap()
    }

    fn counting(name: &str, key: &'static str) -> FnStep<impl Fn(&DeviceId, Meta, CompletionSignal) -> StepStream + Send + Sync> {
        FnStep::new(name, move |_: &DeviceId, meta: Meta, _| {
            once(async move { Ok(meta.with(key, true)) })
        })
    }

    async fn collect(mut run: PipelineRun) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Some(event) = tokio::time::timeout(Duration::from_secs(2), run.next_event())
            .await
            .unwrap()
        {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_steps_run_in_order_and_thread_meta() {
        let pipeline = StepPipeline::default()
            .with_step(counting("first", "a"))
            .with_step(counting("second", "b"));

        let events = collect(pipeline.spawn(device())).await;
        assert_eq!(events.len(), 3);

        match &events[0] {
            PipelineEvent::StepEntered { index, meta } => {
                assert_eq!(*index, 0);
                assert!(meta.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        match &events[1] {
            PipelineEvent::StepEntered { index, meta } => {
                assert_eq!(*index, 1);
                assert!(meta.contains_key("a"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &events[2] {
            PipelineEvent::Completed { meta } => {
                assert!(meta.contains_key("a") && meta.contains_key("b"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_only_last_value_is_kept() {
        let pipeline = StepPipeline::default().with_step(FnStep::new(
            "progress",
            |_: &DeviceId, meta: Meta, _| {
                stream::iter(vec![
                    Ok(meta.clone().with("progress", 10)),
                    Ok(meta.with("progress", 100)),
                ])
                .boxed()
            },
        ));

        let events = collect(pipeline.spawn(device())).await;
        match events.last() {
            Some(PipelineEvent::Completed { meta }) => {
                assert_eq!(meta.get_as::<u32>("progress"), Some(100));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_stops_the_run() {
        let later = Arc::new(AtomicUsize::new(0));
        let calls = later.clone();
        let pipeline = StepPipeline::default()
            .with_step(counting("first", "a"))
            .with_step(FnStep::new("refused", |_: &DeviceId, _: Meta, _| {
                once(async { Err(StepError::failed("user refused")) })
            }))
            .with_step(FnStep::new("never", move |_: &DeviceId, meta: Meta, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                once(async move { Ok(meta) })
            }));

        let events = collect(pipeline.spawn(device())).await;
        match events.last() {
            Some(PipelineEvent::Failed { error, meta }) => {
                assert_eq!(error.step_index, 1);
                assert!(meta.contains_key("a"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_stream_is_no_output() {
        let pipeline = StepPipeline::default().with_step(FnStep::new(
            "silent",
            |_: &DeviceId, _: Meta, _| stream::empty().boxed(),
        ));

        let events = collect(pipeline.spawn(device())).await;
        match events.last() {
            Some(PipelineEvent::Failed { error, .. }) => {
                assert!(matches!(error.source, StepError::NoOutput { index: 0 }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_completion_reaches_current_step_only() {
        let pipeline = StepPipeline::default()
            .with_step(FnStep::new("confirm", |_: &DeviceId, meta: Meta, mut signal: CompletionSignal| {
                once(async move {
                    signal.wait().await?;
                    Ok(meta.with("confirmed", true))
                })
            }));
        let mut run = pipeline.spawn(device());
        assert!(matches!(
            run.next_event().await,
            Some(PipelineEvent::StepEntered { index: 0, .. })
        ));

        run.notify(1);
        let early = tokio::time::timeout(Duration::from_millis(50), run.next_event()).await;
        assert!(early.is_err());

        run.notify(0);
        assert!(matches!(
            run.next_event().await,
            Some(PipelineEvent::Completed { .. })
        ));
    }

    #[tokio::test]
    async fn test_panicking_step_fails_the_run() {
        let pipeline = StepPipeline::default()
            .with_step(counting("first", "a"))
            .with_step(FnStep::new("explode", |_: &DeviceId, meta: Meta, _| {
                once(async move {
                    if meta.contains_key("a") {
                        panic!("device exploded");
                    }
                    Ok(meta)
                })
            }));

        let mut run = pipeline.spawn(device());
        let events = {
            let mut events = Vec::new();
            while let Some(event) = tokio::time::timeout(Duration::from_secs(2), run.next_event())
                .await
                .unwrap()
            {
                events.push(event);
            }
            events
        };

        match events.last() {
            Some(PipelineEvent::Failed { error, meta }) => {
                assert_eq!(error.step_index, 1);
                assert!(meta.contains_key("a"));
                assert!(error.to_string().starts_with("Step 1 failed: step panicked"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(run.is_finished());
        assert!(run.next_event().await.is_none());
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_cancel_drops_the_active_step() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = dropped.clone();
        let pipeline = StepPipeline::default().with_step(FnStep::new(
            "hang",
            move |_: &DeviceId, _: Meta, _| {
                let guard = DropFlag(flag.clone());
                once(async move {
                    let _guard = guard;
                    futures::future::pending::<()>().await;
                    Ok(Meta::new())
                })
            },
        ));

        let mut run = pipeline.spawn(device());
        assert!(run.next_event().await.is_some());

        run.cancel();
        assert!(run.next_event().await.is_none());

        tokio::time::timeout(Duration::from_secs(2), async {
            while !run.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(dropped.load(Ordering::SeqCst));
    }
}
