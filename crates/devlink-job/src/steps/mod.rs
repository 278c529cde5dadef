//! Built-in steps.
//!
//! - [`FnStep`]: a step backed by a closure
//! - [`AwaitConfirmation`]: waits until the caller marks the step done
//! - [`OpenDevice`]: opens the device and records its answer to a probe APDU
//! - [`WithTimeout`]: bounds the duration of another step

pub mod confirm;
pub mod fn_step;
pub mod open_device;
pub mod timeout;

pub use confirm::AwaitConfirmation;
pub use fn_step::FnStep;
pub use open_device::OpenDevice;
pub use timeout::WithTimeout;
