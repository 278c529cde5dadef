//! Closure-backed step.

use crate::step::{CompletionSignal, Step, StepStream};
use devlink_core::{DeviceId, Meta};
use std::fmt;

/// A step whose `run` is a closure.
///
/// # Examples
///
/// ```
/// use devlink_core::{DeviceId, Meta};
/// use devlink_job::step::once;
/// use devlink_job::steps::FnStep;
///
/// let step = FnStep::new("tag-device", |id: &DeviceId, meta: Meta, _| {
///     let id = id.to_string();
///     once(async move { Ok(meta.with("device", id)) })
/// });
/// ```
pub struct FnStep<F> {
    name: String,
    run: F,
}

impl<F> FnStep<F>
where
    F: Fn(&DeviceId, Meta, CompletionSignal) -> StepStream + Send + Sync,
{
    pub fn new(name: impl Into<String>, run: F) -> Self {
        Self {
            name: name.into(),
            run,
        }
    }
}

impl<F> fmt::Debug for FnStep<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

impl<F> Step for FnStep<F>
where
    F: Fn(&DeviceId, Meta, CompletionSignal) -> StepStream + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, device_id: &DeviceId, meta: Meta, completion: CompletionSignal) -> StepStream {
        (self.run)(device_id, meta, completion)
    }
}
