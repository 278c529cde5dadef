//! Job lifecycle state machine.
//!
//! # Phases
//!
//! - `Idle`: no job, or the job was released
//! - `Running(i)`: step `i` is executing
//! - `Failed(i)`: step `i` failed; waiting for retry or cancel
//! - `Done`: every step succeeded
//! - `Cancelled`: the caller abandoned the job
//!
//! # Valid Transitions
//!
//! - any → Running(0) (start, retry, superseding start)
//! - Running(i) → Running(i + 1) → ... → Done
//! - Running(i) → Failed(i) → Cancelled
//! - Running(i) → Cancelled
//! - Idle/Done/Cancelled → Done (a job without steps)
//! - any → Idle (release)
//!
//! # Examples
//!
//! ```
//! use devlink_job::{JobPhase, JobState};
//!
//! let mut state = JobState::default();
//! state.transition_to(JobPhase::Running(0)).unwrap();
//! state.transition_to(JobPhase::Running(1)).unwrap();
//! assert!(state.transition_to(JobPhase::Running(3)).is_err());
//! ```

use crate::error::JobError;
use devlink_core::{DeviceId, Error, Meta};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::error;
use uuid::Uuid;

/// Number of transitions kept for inspection.
const MAX_HISTORY_SIZE: usize = 32;

/// Phase of a device job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "phase", content = "step", rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Idle,
    Running(usize),
    Failed(usize),
    Done,
    Cancelled,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Idle => write!(f, "Idle"),
            JobPhase::Running(index) => write!(f, "Running({index})"),
            JobPhase::Failed(index) => write!(f, "Failed({index})"),
            JobPhase::Done => write!(f, "Done"),
            JobPhase::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl JobPhase {
    /// Check if moving to `target` is allowed from this phase.
    ///
    /// ```
    /// use devlink_job::JobPhase;
    ///
    /// assert!(JobPhase::Running(1).can_transition_to(&JobPhase::Running(2)));
    /// assert!(JobPhase::Running(1).can_transition_to(&JobPhase::Failed(1)));
    /// assert!(!JobPhase::Running(1).can_transition_to(&JobPhase::Failed(0)));
    /// assert!(!JobPhase::Done.can_transition_to(&JobPhase::Cancelled));
    /// ```
    pub fn can_transition_to(&self, target: &JobPhase) -> bool {
        match (self, target) {
            // Start, retry or supersede
            (_, JobPhase::Running(0)) => true,
            // Release
            (_, JobPhase::Idle) => true,
            (JobPhase::Running(current), JobPhase::Running(next)) => *next == current + 1,
            (JobPhase::Running(current), JobPhase::Failed(failed)) => current == failed,
            (JobPhase::Running(_), JobPhase::Done) => true,
            (JobPhase::Running(_) | JobPhase::Failed(_), JobPhase::Cancelled) => true,
            // Zero-step job
            (JobPhase::Idle | JobPhase::Done | JobPhase::Cancelled, JobPhase::Done) => true,
            _ => false,
        }
    }

    /// Running or waiting for a retry.
    pub fn is_active(&self) -> bool {
        matches!(self, JobPhase::Running(_) | JobPhase::Failed(_))
    }

    pub fn step_index(&self) -> Option<usize> {
        match self {
            JobPhase::Running(index) | JobPhase::Failed(index) => Some(*index),
            _ => None,
        }
    }
}

/// Observable state of a job controller.
#[derive(Debug, Clone, Default)]
pub struct JobState {
    pub phase: JobPhase,

    /// Device the current job runs against.
    pub device_id: Option<DeviceId>,

    /// A run is in progress or failed and may be retried.
    pub connecting: bool,

    /// Index of the step the current run is on. Never decreases within a run.
    pub step_index: usize,

    /// Last step index forwarded to the listener after debouncing.
    pub displayed_step: Option<usize>,

    /// Meta at the current step, or the final meta once done.
    pub meta: Meta,

    /// Failure of the last run, cleared on start and retry.
    pub error: Option<JobError>,

    /// Id of the current pipeline run.
    pub run_id: Option<Uuid>,

    history: VecDeque<(JobPhase, JobPhase)>,
}

impl JobState {
    /// Move to `target`, recording the transition.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` and leaves the state untouched
    /// if the transition is not allowed.
    pub fn transition_to(&mut self, target: JobPhase) -> devlink_core::Result<()> {
        if !self.phase.can_transition_to(&target) {
            error!(from = %self.phase, to = %target, "Invalid job transition");
            return Err(Error::InvalidStateTransition {
                from: self.phase.to_string(),
                to: target.to_string(),
            });
        }

        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back((self.phase, target));
        self.phase = target;
        if let Some(index) = target.step_index() {
            self.step_index = index;
        }
        Ok(())
    }

    /// Clear everything about the previous run, keeping the history.
    pub fn reset(&mut self) {
        self.device_id = None;
        self.connecting = false;
        self.step_index = 0;
        self.displayed_step = None;
        self.meta = Meta::new();
        self.error = None;
        self.run_id = None;
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &(JobPhase, JobPhase)> {
        self.history.iter()
    }
}
