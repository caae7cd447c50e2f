//! Software-triggered capture: configure triggering, fire three triggers,
//! report each resulting frame.

use std::time::Duration;

use gencam_core::capabilities::{FrameProducer, Triggerable};
use gencam_driver_spinnaker::{SpinnakerDriver, TriggerMode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let driver = SpinnakerDriver::new_async("22421982".to_string()).await?;
    driver.set_trigger_mode(TriggerMode::Software).await?;

    let mut rx = driver
        .subscribe_frames()
        .await
        .ok_or_else(|| anyhow::anyhow!("driver does not broadcast frames"))?;
    driver.start_stream().await?;
    driver.arm().await?;

    for shot in 0..3 {
        driver.trigger().await?;
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await??;
        tracing::info!(
            shot,
            sequence = frame.sequence,
            mean = frame.mean(),
            "triggered frame"
        );
    }

    driver.stop_stream().await?;
    driver.shutdown().await?;
    Ok(())
}
