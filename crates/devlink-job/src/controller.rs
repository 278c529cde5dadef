//! Job controller.
//!
//! The controller owns at most one [`PipelineRun`] at a time and turns its
//! events into the calls of a [`JobListener`]: step entered (debounced),
//! done, error and cancelled.
//!
//! # Architecture
//!
//! The controller is an actor. [`JobController::spawn`] starts a task that
//! owns the job state and the current run, and returns a cloneable
//! [`JobHandle`] that talks to it over a command channel:
//!
//! ```text
//! JobHandle ──commands──►┌────────────────────┐
//!                        │  actor (select!)   │──► JobListener
//! PipelineRun ──events──►│  commands          │
//!                        │  run events        │──► watch::Receiver<JobState>
//! Debouncer ──fired─────►│  debounce timer    │
//!                        └────────────────────┘
//! ```
//!
//! Every state change happens inside the actor loop, one at a time.
//!
//! # Examples
//!
//! ```no_run
//! use devlink_job::{JobController, JobEvent, StepPipeline};
//! use devlink_job::steps::AwaitConfirmation;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> devlink_job::Result<()> {
//! let pipeline = StepPipeline::default().with_step(AwaitConfirmation::new("confirmed"));
//! let (events_tx, mut events) = mpsc::unbounded_channel::<JobEvent>();
//! let handle = JobController::new(pipeline, events_tx).spawn();
//!
//! handle.start("mock|nano".parse().expect("valid id"))?;
//! handle.notify_step_done()?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

use crate::debounce::Debouncer;
use crate::error::{ControllerError, JobError, Result};
use crate::phase::{JobPhase, JobState};
use crate::pipeline::{PipelineEvent, PipelineRun, StepPipeline};
use devlink_core::constants::DEFAULT_DEBOUNCE_MS;
use devlink_core::{DeviceId, LinkConfig, Meta};
use std::future;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Controller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobConfig {
    /// Trailing debounce window for step-entered notifications.
    pub debounce: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

impl From<&LinkConfig> for JobConfig {
    fn from(config: &LinkConfig) -> Self {
        Self {
            debounce: config.debounce(),
        }
    }
}

/// Receiver of a controller's outward notifications.
///
/// Callbacks run on the controller task and must not block.
pub trait JobListener: Send + 'static {
    /// The job moved to step `index`. Debounced.
    fn on_step_entered(&mut self, _index: usize, _meta: &Meta) {}

    /// Every step succeeded. Called once per successful run.
    fn on_done(&mut self, _device_id: &DeviceId, _meta: &Meta) {}

    /// A step failed. Called once per failed run.
    fn on_error(&mut self, _error: &JobError) {}

    /// The caller cancelled an active job.
    fn on_cancelled(&mut self) {}
}

/// Listener notifications as values, for channel-style consumers.
#[derive(Debug, Clone)]
pub enum JobEvent {
    StepEntered { index: usize, meta: Meta },
    Done { device_id: DeviceId, meta: Meta },
    Error(JobError),
    Cancelled,
}

impl JobListener for mpsc::UnboundedSender<JobEvent> {
    fn on_step_entered(&mut self, index: usize, meta: &Meta) {
        let _ = self.send(JobEvent::StepEntered {
            index,
            meta: meta.clone(),
        });
    }

    fn on_done(&mut self, device_id: &DeviceId, meta: &Meta) {
        let _ = self.send(JobEvent::Done {
            device_id: device_id.clone(),
            meta: meta.clone(),
        });
    }

    fn on_error(&mut self, error: &JobError) {
        let _ = self.send(JobEvent::Error(error.clone()));
    }

    fn on_cancelled(&mut self) {
        let _ = self.send(JobEvent::Cancelled);
    }
}

#[derive(Debug)]
enum Command {
    Start(DeviceId),
    Retry,
    Cancel,
    Release,
    StepDone(Option<usize>),
    Shutdown,
}

/// Drives device jobs for one consumer.
#[derive(Debug)]
pub struct JobController<L> {
    pipeline: StepPipeline,
    listener: L,
    config: JobConfig,
}

impl<L: JobListener> JobController<L> {
    pub fn new(pipeline: StepPipeline, listener: L) -> Self {
        Self {
            pipeline,
            listener,
            config: JobConfig::default(),
        }
    }

    pub fn with_config(mut self, config: JobConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the controller task on the current Tokio runtime.
    pub fn spawn(self) -> JobHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(JobState::default());

        let actor = Actor {
            pipeline: self.pipeline,
            listener: self.listener,
            commands: commands_rx,
            state: state_tx,
            run: None,
            debouncer: Debouncer::new(self.config.debounce),
        };
        tokio::spawn(actor.run());

        JobHandle {
            commands: commands_tx,
            state: state_rx,
        }
    }
}

/// Cloneable handle to a running [`JobController`].
///
/// The controller stops when [`shutdown`](JobHandle::shutdown) is called or
/// every handle has been dropped.
#[derive(Debug, Clone)]
pub struct JobHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<JobState>,
}

impl JobHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ControllerError::Closed)
    }

    /// Start a job for `device_id`, superseding any job in progress.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Closed` if the controller has stopped.
    pub fn start(&self, device_id: DeviceId) -> Result<()> {
        self.send(Command::Start(device_id))
    }

    /// Re-run the failed job from the first step. Ignored unless the last
    /// run failed.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Closed` if the controller has stopped.
    pub fn retry(&self) -> Result<()> {
        self.send(Command::Retry)
    }

    /// Abandon the active job. Ignored when no job is active.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Closed` if the controller has stopped.
    pub fn cancel(&self) -> Result<()> {
        self.send(Command::Cancel)
    }

    /// Tear the job down without notifying the listener.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Closed` if the controller has stopped.
    pub fn release(&self) -> Result<()> {
        self.send(Command::Release)
    }

    /// Mark the step currently shown to the user as done.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Closed` if the controller has stopped.
    pub fn notify_step_done(&self) -> Result<()> {
        self.send(Command::StepDone(None))
    }

    /// Mark step `index` as done. Has no effect unless it is the step the
    /// run is on.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Closed` if the controller has stopped.
    pub fn notify_step_done_at(&self, index: usize) -> Result<()> {
        self.send(Command::StepDone(Some(index)))
    }

    /// Snapshot of the job state.
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// Subscribe to job state changes.
    pub fn watch_state(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Stop the controller and wait for its task to release the run.
    pub async fn shutdown(&self) {
        if self.send(Command::Shutdown).is_ok() {
            self.commands.closed().await;
        }
    }
}

struct Actor<L> {
    pipeline: StepPipeline,
    listener: L,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<JobState>,
    run: Option<PipelineRun>,
    debouncer: Debouncer<(usize, Meta)>,
}

async fn next_run_event(run: &mut Option<PipelineRun>) -> Option<PipelineEvent> {
    match run {
        Some(run) => run.next_event().await,
        None => future::pending().await,
    }
}

impl<L: JobListener> Actor<L> {
    async fn run(mut self) {
        debug!(steps = self.pipeline.len(), "Job controller started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                event = next_run_event(&mut self.run) => match event {
                    Some(event) => self.on_pipeline_event(event),
                    None => self.run = None,
                },
                (index, meta) = self.debouncer.fired() => self.forward_step(index, meta),
            }
        }

        self.teardown();
        debug!("Job controller stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start(device_id) => self.start(device_id),
            Command::Retry => self.retry(),
            Command::Cancel => self.cancel(),
            Command::Release => self.release(),
            Command::StepDone(index) => self.step_done(index),
            Command::Shutdown => {}
        }
    }

    fn transition(&mut self, phase: JobPhase) {
        self.state.send_modify(|state| {
            // Rejected transitions are logged by the state.
            let _ = state.transition_to(phase);
        });
    }

    fn teardown(&mut self) {
        if let Some(run) = self.run.take() {
            run.cancel();
        }
        self.debouncer.cancel();
    }

    fn start(&mut self, device_id: DeviceId) {
        self.teardown();
        self.state.send_modify(|state| {
            state.reset();
            state.device_id = Some(device_id.clone());
        });

        if self.pipeline.is_empty() {
            self.transition(JobPhase::Done);
            info!(device = %device_id, "Job completed without steps");
            self.listener.on_done(&device_id, &Meta::new());
            return;
        }

        self.begin_run(device_id);
    }

    fn begin_run(&mut self, device_id: DeviceId) {
        let run = self.pipeline.spawn(device_id);
        let run_id = run.id();
        self.run = Some(run);

        self.transition(JobPhase::Running(0));
        self.state.send_modify(|state| {
            state.connecting = true;
            state.step_index = 0;
            state.displayed_step = None;
            state.meta = Meta::new();
            state.error = None;
            state.run_id = Some(run_id);
        });
    }

    fn retry(&mut self) {
        let (phase, device_id) = {
            let state = self.state.borrow();
            (state.phase, state.device_id.clone())
        };

        match (phase, device_id) {
            (JobPhase::Failed(index), Some(device_id)) => {
                debug!(device = %device_id, failed_step = index, "Retrying job from the first step");
                self.teardown();
                self.begin_run(device_id);
            }
            _ => debug!(%phase, "Retry ignored, no failed job"),
        }
    }

    fn cancel(&mut self) {
        let phase = self.state.borrow().phase;
        if !phase.is_active() {
            debug!(%phase, "Cancel ignored, no active job");
            return;
        }

        self.teardown();
        self.transition(JobPhase::Cancelled);
        self.state.send_modify(JobState::reset);
        debug!("Job cancelled");
        self.listener.on_cancelled();
    }

    fn release(&mut self) {
        self.teardown();
        self.transition(JobPhase::Idle);
        self.state.send_modify(JobState::reset);
    }

    fn step_done(&mut self, index: Option<usize>) {
        let Some(run) = &self.run else {
            debug!(?index, "Completion ignored, nothing running");
            return;
        };

        let index = index.unwrap_or_else(|| self.state.borrow().displayed_step.unwrap_or(0));
        debug!(run = %run.id(), index, "Step completion");
        run.notify(index);
    }

    fn on_pipeline_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::StepEntered { index, meta } => {
                self.transition(JobPhase::Running(index));
                self.state.send_modify(|state| state.meta = meta.clone());
                self.debouncer.call((index, meta));
            }
            PipelineEvent::Completed { meta } => {
                self.run = None;
                self.debouncer.cancel();
                self.transition(JobPhase::Done);
                self.state.send_modify(|state| {
                    state.connecting = false;
                    state.meta = meta.clone();
                });

                let device_id = self.state.borrow().device_id.clone();
                if let Some(device_id) = device_id {
                    info!(device = %device_id, "Job completed");
                    self.listener.on_done(&device_id, &meta);
                }
            }
            PipelineEvent::Failed { error, meta } => {
                self.run = None;
                self.transition(JobPhase::Failed(error.step_index));
                self.state.send_modify(|state| {
                    state.error = Some(error.clone());
                    state.meta = meta;
                });
                warn!(%error, "Job failed");
                self.listener.on_error(&error);
            }
        }
    }

    fn forward_step(&mut self, index: usize, meta: Meta) {
        self.state
            .send_modify(|state| state.displayed_step = Some(index));
        self.listener.on_step_entered(index, &meta);
    }
}
