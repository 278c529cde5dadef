//! Process configuration read from `DEVLINK_*` environment variables.
//!
//! | Variable                         | Field                  | Default  |
//! |----------------------------------|------------------------|----------|
//! | `DEVLINK_DEBUG`                  | `debug`                | `false`  |
//! | `DEVLINK_DEBUG_HTTP_PROXY`       | `debug_http_proxy`     | unset    |
//! | `DEVLINK_DEBOUNCE_MS`            | `debounce_ms`          | `500`    |
//! | `DEVLINK_PROBE_TIMEOUT_MS`       | `probe_timeout_ms`     | `2000`   |
//! | `DEVLINK_HID_VENDOR_ID`          | `hid_vendor_id`        | `11415`  |
//! | `DEVLINK_HID_POLL_INTERVAL_MS`   | `hid_poll_interval_ms` | `1000`   |
//!
//! `DEVLINK_DEBUG_HTTP_PROXY` holds one or more proxy URLs separated by `|`.

use crate::Result;
use crate::constants::{
    DEFAULT_DEBOUNCE_MS, DEFAULT_HID_POLL_INTERVAL_MS, DEFAULT_PROBE_TIMEOUT_MS, ENV_PREFIX,
    LEDGER_VENDOR_ID, TAG_SEPARATOR,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime configuration for transports and jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Enable verbose tracing on every opened connection.
    #[serde(default)]
    pub debug: bool,

    /// `|`-separated list of debug proxy URLs.
    #[serde(default)]
    pub debug_http_proxy: Option<String>,

    /// Trailing debounce window for step-entered notifications.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Timeout applied when probing a debug proxy.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// USB vendor id the HID provider listens for.
    #[serde(default = "default_hid_vendor_id")]
    pub hid_vendor_id: u16,

    /// Interval between two HID enumerations.
    #[serde(default = "default_hid_poll_interval_ms")]
    pub hid_poll_interval_ms: u64,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

fn default_hid_vendor_id() -> u16 {
    LEDGER_VENDOR_ID
}

fn default_hid_poll_interval_ms() -> u64 {
    DEFAULT_HID_POLL_INTERVAL_MS
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            debug: false,
            debug_http_proxy: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            hid_vendor_id: LEDGER_VENDOR_ID,
            hid_poll_interval_ms: DEFAULT_HID_POLL_INTERVAL_MS,
        }
    }
}

impl LinkConfig {
    /// Load the configuration from `DEVLINK_*` environment variables.
    ///
    /// # Errors
    /// Returns `Error::Config` if a variable is present but malformed.
    pub fn from_env() -> Result<Self> {
        Ok(envy::prefixed(ENV_PREFIX).from_env::<Self>()?)
    }

    /// Load the configuration from an explicit set of variables.
    ///
    /// # Errors
    /// Returns `Error::Config` if a variable is present but malformed.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(ENV_PREFIX).from_iter::<_, Self>(vars)?)
    }

    /// Debug proxy URLs, in declaration order, blanks removed.
    #[must_use]
    pub fn proxy_urls(&self) -> Vec<String> {
        self.debug_http_proxy
            .as_deref()
            .map(|raw| {
                raw.split(TAG_SEPARATOR)
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    #[must_use]
    pub fn hid_poll_interval(&self) -> Duration {
        Duration::from_millis(self.hid_poll_interval_ms)
    }
}
