//! Shared helpers for job engine integration tests.
//!
//! Steps here are small closures with observable side effects: how often
//! they ran, which meta they were given, and whether their stream was
//! dropped.

#![allow(dead_code)]

use devlink_core::{DeviceId, Meta};
use devlink_job::step::once;
use devlink_job::steps::FnStep;
use devlink_job::{
    CompletionSignal, JobConfig, JobController, JobEvent, JobHandle, StepError, StepPipeline,
    StepStream,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Upper bound for any single await in these tests.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Debounce window used by the controller tests.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

pub fn device(key: &str) -> DeviceId {
    format!("mock|{key}").parse().expect("valid device id")
}

/// Controller with a channel listener and the test debounce window.
pub fn spawn_controller(pipeline: StepPipeline) -> (JobHandle, mpsc::UnboundedReceiver<JobEvent>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let handle = JobController::new(pipeline, events_tx)
        .with_config(JobConfig { debounce: DEBOUNCE })
        .spawn();
    (handle, events_rx)
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<JobEvent>) -> JobEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("job event in time")
        .expect("controller still running")
}

/// Assert that no listener event arrives within the timeout.
pub async fn assert_quiet(events: &mut mpsc::UnboundedReceiver<JobEvent>) {
    if let Ok(Some(event)) = tokio::time::timeout(EVENT_TIMEOUT, events.recv()).await {
        panic!("unexpected job event {event:?}");
    }
}

/// Observations made by a [`probe_step`].
#[derive(Debug, Default)]
pub struct Probe {
    pub calls: AtomicUsize,
    pub inputs: Mutex<Vec<Meta>>,
    pub dropped: AtomicBool,
}

impl Probe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<Meta> {
        self.inputs.lock().expect("probe lock").clone()
    }

    pub fn was_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

struct DropGuard(Arc<Probe>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.dropped.store(true, Ordering::SeqCst);
    }
}

/// How a probe step finishes.
#[derive(Debug, Clone, Copy)]
pub enum Finish {
    /// Right away.
    Immediately,
    /// After sleeping this long.
    After(Duration),
    /// When its completion signal fires.
    OnCompletion,
    /// With an error, on the first `n` calls, then right away.
    FailFirst(usize),
    /// By panicking after `delay`, on the first `n` calls, then right away.
    PanicFirst(usize, Duration),
}

/// A step recording its calls, that sets `key` in the meta when it finishes.
pub fn probe_step(
    key: &'static str,
    finish: Finish,
) -> (
    FnStep<impl Fn(&DeviceId, Meta, CompletionSignal) -> StepStream + Send + Sync>,
    Arc<Probe>,
) {
    let probe = Arc::new(Probe::default());
    let observed = probe.clone();

    let step = FnStep::new(key, move |_: &DeviceId, meta: Meta, mut signal: CompletionSignal| {
        let call = observed.calls.fetch_add(1, Ordering::SeqCst) + 1;
        observed.inputs.lock().expect("probe lock").push(meta.clone());
        let guard = DropGuard(observed.clone());

        once(async move {
            let _guard = guard;
            match finish {
                Finish::Immediately => {}
                Finish::After(delay) => tokio::time::sleep(delay).await,
                Finish::OnCompletion => signal.wait().await?,
                Finish::FailFirst(n) if call <= n => {
                    return Err(StepError::failed(format!("{key} failed on call {call}")));
                }
                Finish::FailFirst(_) => {}
                Finish::PanicFirst(n, delay) if call <= n => {
                    tokio::time::sleep(delay).await;
                    panic!("{key} panicked on call {call}");
                }
                Finish::PanicFirst(..) => {}
            }
            Ok(meta.with(key, true))
        })
    });

    (step, probe)
}
