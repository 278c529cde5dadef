//! Process-wide debug mode.
//!
//! When enabled, every connection opened through the registry has verbose
//! exchange tracing switched on. The flag is read at open time, so flipping
//! it does not affect connections that are already open.

use std::sync::atomic::{AtomicBool, Ordering};

static DEBUG_MODE: AtomicBool = AtomicBool::new(false);

/// Turn debug mode on or off for connections opened from now on.
pub fn set_debug_mode(enabled: bool) {
    DEBUG_MODE.store(enabled, Ordering::Relaxed);
}

/// Whether debug mode is on.
pub fn debug_mode() -> bool {
    DEBUG_MODE.load(Ordering::Relaxed)
}
