//! Subcommand implementations.

pub mod list;
pub mod run;

use anyhow::{Context, Result};
use devlink_core::LinkConfig;
use devlink_transport::TransportRegistry;
use devlink_transport::mock::MockTransport;
use tracing::info;

/// Demo devices offered by `--mock`, as (key, name).
const DEMO_DEVICES: [(&str, &str); 2] = [("nano-s", "Nano S"), ("nano-x", "Nano X")];

/// The registry for this invocation.
pub fn build_registry(config: &LinkConfig, mock: bool) -> Result<TransportRegistry> {
    if !mock {
        let registry =
            TransportRegistry::from_config(config).context("failed to set up transports")?;
        info!(transports = ?registry.tags(), "Transports ready");
        return Ok(registry);
    }

    let (provider, handle) = MockTransport::new("mock");
    for (key, name) in DEMO_DEVICES {
        handle.add_device(key, name)?;
    }
    info!(devices = DEMO_DEVICES.len(), "Using mock transport");

    Ok(TransportRegistry::builder().register(provider)?.build())
}
