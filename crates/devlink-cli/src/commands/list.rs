use anyhow::Result;
use devlink_transport::{DiscoverySession, TransportRegistry};
use std::time::Duration;
use tracing::info;

/// Collect discovery events for `seconds` and print what is still visible.
pub async fn run(registry: &TransportRegistry, seconds: u64, json: bool) -> Result<()> {
    info!(seconds, "Discovering devices");
    let session =
        DiscoverySession::collect_for(registry.discover_all(), Duration::from_secs(seconds)).await;

    if json {
        println!("{}", serde_json::to_string_pretty(session.devices())?);
        return Ok(());
    }

    if session.is_empty() {
        println!("No devices found");
        return Ok(());
    }

    for seen in session.devices() {
        let device = &seen.descriptor;
        println!("{:<12} {:<20} {}", device.kind.to_string(), device.name, device.id);
    }
    Ok(())
}
