//! Grab a single free-run frame and print its statistics.
//!
//! Runs against the mock device by default; build with
//! `--features spinnaker_sdk` to drive real hardware.

use gencam_driver_spinnaker::SpinnakerDriver;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let driver = SpinnakerDriver::new_async("22421982".to_string()).await?;
    let (width, height) = driver.resolution();
    tracing::info!(width, height, "camera ready");

    let applied = driver.set_exposure_us(15_000.0).await?;
    tracing::info!(exposure_us = applied, "exposure applied");

    let frame = driver.acquire_frame().await?;
    tracing::info!(
        width = frame.width,
        height = frame.height,
        format = frame.format.as_str(),
        mean = frame.mean(),
        "frame captured"
    );

    driver.shutdown().await?;
    Ok(())
}
