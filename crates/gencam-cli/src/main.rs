//! gencam - configure an industrial camera and capture frames.
//!
//! Opens the camera, applies exposure/gain/frame-rate/trigger settings
//! (reporting the values the device actually accepted), captures the
//! requested number of frames and logs per-frame statistics. The last
//! frame can be written to disk as raw bytes with a JSON metadata sidecar.

mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use gencam_core::capabilities::{FrameProducer, Triggerable};
use gencam_core::Frame;
use gencam_driver_spinnaker::{SpinnakerDriver, TriggerMode};

use crate::settings::CaptureSettings;

/// How long to wait for each frame; hardware-triggered captures depend on
/// an external line signal and may take a while.
const FRAME_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TriggerArg {
    None,
    Software,
    Hardware,
}

impl From<TriggerArg> for TriggerMode {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::None => TriggerMode::None,
            TriggerArg::Software => TriggerMode::Software,
            TriggerArg::Hardware => TriggerMode::Hardware,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "gencam", version, about = "Industrial camera capture tool")]
struct Args {
    /// Settings file (TOML); command-line flags override file values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera serial number
    #[arg(long)]
    serial: Option<String>,

    /// Exposure time in microseconds (clamped to the device range)
    #[arg(long)]
    exposure_us: Option<f64>,

    /// Sensor gain in dB (clamped to the device range)
    #[arg(long)]
    gain_db: Option<f64>,

    /// Free-run frame rate in Hz (clamped to the device range)
    #[arg(long)]
    frame_rate: Option<f64>,

    /// Trigger mode
    #[arg(long, value_enum)]
    trigger: Option<TriggerArg>,

    /// Number of frames to capture
    #[arg(long)]
    frames: Option<u32>,

    /// Write the last frame here (raw bytes; metadata goes to a .json
    /// sidecar next to it)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut settings = CaptureSettings::load(args.config.as_deref())
        .context("failed to load capture settings")?;
    if let Some(serial) = args.serial {
        settings.serial = serial;
    }
    if args.exposure_us.is_some() {
        settings.exposure_us = args.exposure_us;
    }
    if args.gain_db.is_some() {
        settings.gain_db = args.gain_db;
    }
    if args.frame_rate.is_some() {
        settings.frame_rate_hz = args.frame_rate;
    }
    if let Some(trigger) = args.trigger {
        settings.trigger = TriggerMode::from(trigger).as_str().to_string();
    }
    if let Some(frames) = args.frames {
        settings.frames = frames;
    }

    run(settings, args.output.as_deref()).await
}

async fn run(settings: CaptureSettings, output: Option<&Path>) -> Result<()> {
    let driver = SpinnakerDriver::new_async(settings.serial.clone())
        .await
        .context("failed to open camera")?;
    let (width, height) = driver.resolution();
    tracing::info!(serial = %settings.serial, width, height, "camera ready");

    if let Some(requested) = settings.exposure_us {
        let applied = driver.set_exposure_us(requested).await?;
        tracing::info!(requested, applied, "exposure set (us)");
    }
    if let Some(requested) = settings.gain_db {
        let applied = driver.set_gain_db(requested).await?;
        tracing::info!(requested, applied, "gain set (dB)");
    }
    if let Some(requested) = settings.frame_rate_hz {
        let applied = driver.set_frame_rate_hz(requested).await?;
        tracing::info!(requested, applied, "frame rate set (Hz)");
    }

    let trigger = TriggerMode::from_str(&settings.trigger);
    driver.set_trigger_mode(trigger).await?;
    tracing::info!(trigger = trigger.as_str(), "trigger configured");

    let mut rx = driver
        .subscribe_frames()
        .await
        .ok_or_else(|| anyhow::anyhow!("driver does not broadcast frames"))?;
    driver.start_stream().await?;
    if trigger == TriggerMode::Software {
        driver.arm().await?;
    }

    let mut last: Option<Arc<Frame>> = None;
    for index in 0..settings.frames {
        if trigger == TriggerMode::Software {
            driver.trigger().await?;
        }
        let frame = tokio::time::timeout(FRAME_WAIT, rx.recv())
            .await
            .context("timed out waiting for frame")?
            .context("frame stream closed")?;
        tracing::info!(
            index,
            sequence = frame.sequence,
            mean = frame.mean(),
            "frame captured"
        );
        last = Some(frame);
    }

    driver.stop_stream().await?;

    if let (Some(path), Some(frame)) = (output, last) {
        write_frame(path, &frame)?;
        tracing::info!(path = %path.display(), "last frame written");
    }

    driver.shutdown().await?;
    Ok(())
}

/// Write the raw pixel bytes plus a JSON metadata sidecar.
fn write_frame(path: &Path, frame: &Frame) -> Result<()> {
    std::fs::write(path, &frame.data)
        .with_context(|| format!("failed to write frame to {}", path.display()))?;

    let metadata = serde_json::json!({
        "width": frame.width,
        "height": frame.height,
        "pixel_format": frame.format.as_str(),
        "sequence": frame.sequence,
        "mean": frame.mean(),
    });
    let sidecar = path.with_extension("json");
    std::fs::write(&sidecar, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("failed to write metadata to {}", sidecar.display()))?;
    Ok(())
}
