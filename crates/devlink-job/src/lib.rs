//! Device job engine.
//!
//! A device job runs an ordered list of [`Step`]s against one device id,
//! threading a [`Meta`](devlink_core::Meta) record from step to step. The
//! crate is split in two layers:
//!
//! - [`StepPipeline`] executes one run: steps strictly in sequence, each one
//!   announced before it starts, with a completion channel filtered to the
//!   current step so callers can release a step that waits for the user.
//! - [`JobController`] owns at most one run at a time and exposes the job to
//!   a consumer: start, retry, cancel, release, debounced progress and a
//!   single outcome per run.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start──► Running(0) ──► Running(1) ──► ... ──► Done
//!                      │              │
//!                      └──────────────┴──► Failed(i) ──retry──► Running(0)
//!                                               │
//!                              cancel ◄─────────┘
//! ```
//!
//! Retry re-runs every step from the first one with an empty `Meta`.
//!
//! # Example
//!
//! ```no_run
//! use devlink_job::steps::{AwaitConfirmation, OpenDevice};
//! use devlink_job::{JobController, JobEvent, StepPipeline};
//! use devlink_transport::{DeviceOpener, TransportRegistry};
//! use tokio::sync::mpsc;
//!
//! # async fn example(registry: TransportRegistry) -> devlink_job::Result<()> {
//! let opener = DeviceOpener::from(registry);
//! let pipeline = StepPipeline::default()
//!     .with_step(OpenDevice::new(opener))
//!     .with_step(AwaitConfirmation::new("confirmed"));
//!
//! let (events_tx, mut events) = mpsc::unbounded_channel();
//! let handle = JobController::new(pipeline, events_tx).spawn();
//! handle.start("usb|{\"path\":\"1-1\"}".parse().expect("valid id"))?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         JobEvent::StepEntered { index: 1, .. } => handle.notify_step_done()?,
//!         JobEvent::Done { meta, .. } => println!("{}", meta.to_value()),
//!         JobEvent::Error(error) => eprintln!("{error}"),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod debounce;
pub mod error;
pub mod phase;
pub mod pipeline;
pub mod step;
pub mod steps;

pub use controller::{JobConfig, JobController, JobEvent, JobHandle, JobListener};
pub use debounce::Debouncer;
pub use error::{ControllerError, JobError, Result, StepError};
pub use phase::{JobPhase, JobState};
pub use pipeline::{PipelineEvent, PipelineRun, StepPipeline};
pub use step::{CompletionEvent, CompletionSignal, Step, StepStream};
