//! Atomic hardware capabilities.
//!
//! Instead of one monolithic `Camera` trait, devices implement the specific
//! capabilities they support: this Blackfly-class driver is
//! `ExposureControl + GainControl + FrameRateControl + Triggerable +
//! FrameProducer + Parameterized`. Small traits keep contracts focused and
//! make hardware-agnostic code (and mocks) straightforward.
//!
//! Each capability trait is async (`#[async_trait]`), thread-safe
//! (`Send + Sync`) and uses `anyhow::Result` for errors.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::data::Frame;
use crate::parameter::ParameterSet;

/// Capability: exposure/integration time control.
///
/// Exposure is in seconds at this boundary (drivers convert to their
/// device-native unit). Setting exposure never starts acquisition; the
/// value applies to subsequent frames. Requests outside the device range
/// are clamped to it - read back to observe the applied value.
#[async_trait]
pub trait ExposureControl: Send + Sync {
    /// Set exposure time in seconds.
    async fn set_exposure(&self, seconds: f64) -> Result<()>;

    /// Get the current exposure time in seconds.
    async fn get_exposure(&self) -> Result<f64>;
}

/// Capability: analog gain control, in decibels.
///
/// Same clamping contract as [`ExposureControl`].
#[async_trait]
pub trait GainControl: Send + Sync {
    /// Set sensor gain in dB.
    async fn set_gain_db(&self, db: f64) -> Result<()>;

    /// Get the current sensor gain in dB.
    async fn get_gain_db(&self) -> Result<f64>;
}

/// Capability: acquisition frame rate control, in Hz.
#[async_trait]
pub trait FrameRateControl: Send + Sync {
    /// Set the free-run acquisition frame rate in Hz.
    async fn set_frame_rate(&self, hz: f64) -> Result<()>;

    /// Get the current acquisition frame rate in Hz.
    async fn get_frame_rate(&self) -> Result<f64>;
}

/// Capability: external triggering.
///
/// `arm()` prepares the device, `trigger()` issues a software trigger.
/// Devices in free-run mode accept the trigger command but it has no
/// effect on frame delivery.
#[async_trait]
pub trait Triggerable: Send + Sync {
    /// Arm the device for triggering.
    async fn arm(&self) -> Result<()>;

    /// Issue a software trigger.
    async fn trigger(&self) -> Result<()>;

    /// Whether the device is currently armed.
    async fn is_armed(&self) -> Result<bool> {
        anyhow::bail!("armed state query not supported by this device")
    }
}

/// Capability: continuous frame production.
#[async_trait]
pub trait FrameProducer: Send + Sync {
    /// Start continuous acquisition.
    async fn start_stream(&self) -> Result<()>;

    /// Stop continuous acquisition. Idempotent.
    async fn stop_stream(&self) -> Result<()>;

    /// Sensor resolution (width, height) in pixels.
    fn resolution(&self) -> (u32, u32);

    /// Subscribe to the frame broadcast, if the producer distributes
    /// frames this way.
    async fn subscribe_frames(&self) -> Option<broadcast::Receiver<Arc<Frame>>>;

    /// Whether acquisition is currently running.
    async fn is_streaming(&self) -> Result<bool>;

    /// Frames produced since streaming started.
    fn frame_count(&self) -> u64;
}

/// Capability: generic parameter introspection.
pub trait Parameterized: Send + Sync {
    /// The device's full parameter table.
    fn parameters(&self) -> &ParameterSet;
}
