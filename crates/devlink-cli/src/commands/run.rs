//! `devlink run`: open a device, probe it and optionally wait for the user.

use anyhow::{Context, Result, bail};
use devlink_core::{DeviceId, LinkConfig};
use devlink_job::steps::{AwaitConfirmation, OpenDevice, WithTimeout};
use devlink_job::{JobConfig, JobController, JobEvent, JobHandle, StepPipeline};
use devlink_transport::{DeviceOpener, TransportRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

const CONFIRM_KEY: &str = "confirmed";

/// Steps of the job run by the CLI.
pub fn pipeline(opener: DeviceOpener, confirm: bool, timeout: Duration) -> StepPipeline {
    let pipeline = StepPipeline::default().with_step(WithTimeout::new(OpenDevice::new(opener), timeout));
    if confirm {
        pipeline.with_step(AwaitConfirmation::new(CONFIRM_KEY))
    } else {
        pipeline
    }
}

pub async fn run(
    registry: TransportRegistry,
    config: &LinkConfig,
    device_id: &str,
    confirm: bool,
    timeout: u64,
) -> Result<()> {
    let device_id: DeviceId = device_id
        .parse()
        .with_context(|| format!("invalid device id {device_id:?}"))?;
    let opener = DeviceOpener::new(Arc::new(registry));
    let steps = pipeline(opener, confirm, Duration::from_secs(timeout));
    let names: Vec<String> = steps.step_names().into_iter().map(str::to_string).collect();

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let handle = JobController::new(steps, events_tx)
        .with_config(JobConfig::from(config))
        .spawn();
    handle.start(device_id)?;

    let outcome = drive(&handle, &mut events, &names, confirm).await;
    handle.shutdown().await;
    outcome
}

async fn drive(
    handle: &JobHandle,
    events: &mut mpsc::UnboundedReceiver<JobEvent>,
    names: &[String],
    confirm: bool,
) -> Result<()> {
    let mut confirmation = None;

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling job");
                handle.cancel()?;
                continue;
            }
        };

        match event {
            Some(JobEvent::StepEntered { index, .. }) => {
                let name = names.get(index).map_or("?", String::as_str);
                eprintln!("[{}/{}] {name}", index + 1, names.len());
                if confirm && name == "await-confirmation" && confirmation.is_none() {
                    eprintln!("Press Enter to confirm");
                    confirmation = Some(tokio::spawn(confirm_from_stdin(handle.clone(), index)));
                }
            }
            Some(JobEvent::Done { device_id, meta }) => {
                info!(device = %device_id, "Job done");
                println!("{}", serde_json::to_string_pretty(&meta.to_value())?);
                break;
            }
            Some(JobEvent::Error(error)) => bail!(error),
            Some(JobEvent::Cancelled) => bail!("job cancelled"),
            None => bail!("job controller stopped"),
        }
    }

    if let Some(task) = confirmation {
        task.abort();
    }
    Ok(())
}

async fn confirm_from_stdin(handle: JobHandle, index: usize) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    match lines.next_line().await {
        Ok(Some(_)) => {
            let _ = handle.notify_step_done_at(index);
        }
        Ok(None) => {
            let _ = handle.cancel();
        }
        Err(error) => {
            warn!(%error, "Failed to read confirmation");
            let _ = handle.cancel();
        }
    }
}
