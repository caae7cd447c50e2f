//! FLIR Spinnaker camera driver (Blackfly-class devices).
//!
//! Exposes exposure, gain, frame rate and trigger mode through the gencam
//! parameter layer and produces frames as tightly packed buffers. All
//! vendor SDK calls sit behind the `spinnaker_sdk` feature; the default
//! build drives a built-in mock device with the same node surface, so the
//! whole parameter/trigger/conversion path works without hardware.
//!
//! Numeric settings follow the device's own limits: requests are clamped
//! to the bounds the camera reports, and the applied value is read back
//! into the parameter.

pub mod components;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use gencam_core::capabilities::{
    ExposureControl, FrameProducer, FrameRateControl, GainControl, Parameterized, Triggerable,
};
use gencam_core::parameter::{Parameter, ParameterSet};
use gencam_core::{CamError, Frame};

use crate::components::acquisition::SpinAcquisition;
use crate::components::connection::SpinConnection;
use crate::components::features;
use crate::components::nodemap::{self, genicam};

pub use crate::components::features::{CameraInfo, TriggerMode};

/// Temperature refresh interval for the background poll.
const TEMPERATURE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Driver for FLIR Spinnaker cameras.
///
/// Construct with [`SpinnakerDriver::new_async`], stop cleanly with
/// [`SpinnakerDriver::shutdown`] before dropping: the `Drop` impl cannot
/// run async teardown and only flags the leak.
pub struct SpinnakerDriver {
    camera_name: String,

    acquisition: Arc<SpinAcquisition>,
    connection: Arc<Mutex<SpinConnection>>,

    // Acquisition parameters
    exposure_us: Parameter<f64>,
    gain_db: Parameter<f64>,
    frame_rate_hz: Parameter<f64>,
    gamma: Parameter<f64>,
    trigger_mode: Parameter<String>,
    streaming: Parameter<bool>,
    armed: Parameter<bool>,

    // Info parameters
    temperature_c: Parameter<f64>,

    params: ParameterSet,

    sensor_width: u32,
    sensor_height: u32,

    temperature_poll: JoinHandle<()>,
}

impl SpinnakerDriver {
    /// Open the camera with the given serial number and prepare it for
    /// acquisition: manual exposure/gain, unity gamma, continuous
    /// acquisition mode, triggering off.
    pub async fn new_async(camera_name: String) -> Result<Self> {
        tracing::info!(camera = %camera_name, "opening Spinnaker camera");
        tracing::info!(
            "spinnaker_sdk feature enabled: {}",
            cfg!(feature = "spinnaker_sdk")
        );

        // SDK init and camera open are blocking vendor calls.
        let connection = tokio::task::spawn_blocking({
            #[cfg(feature = "spinnaker_sdk")]
            let serial = camera_name.clone();
            move || -> Result<Arc<Mutex<SpinConnection>>> {
                #[cfg(feature = "spinnaker_sdk")]
                let mut conn = SpinConnection::new();
                #[cfg(not(feature = "spinnaker_sdk"))]
                let conn = SpinConnection::new();

                #[cfg(feature = "spinnaker_sdk")]
                {
                    conn.initialize()?;
                    conn.open(&serial)?;
                }
                #[cfg(not(feature = "spinnaker_sdk"))]
                {
                    tracing::warn!("spinnaker_sdk feature not enabled - using mock device");
                }
                Ok(Arc::new(Mutex::new(conn)))
            }
        })
        .await??;

        Self::create(camera_name, connection).await
    }

    async fn create(camera_name: String, connection: Arc<Mutex<SpinConnection>>) -> Result<Self> {
        // Configure device defaults and read the initial state.
        let (info, width, height, exposure0, gain0, frame_rate0, gamma0, temperature0) = {
            let guard = connection.lock().await;
            features::configure_defaults(&guard)?;

            let info = features::camera_info(&guard).unwrap_or_else(|e| {
                tracing::warn!("failed to read camera info: {e}");
                CameraInfo {
                    model_name: "Unknown".to_string(),
                    vendor_name: "Unknown".to_string(),
                    serial_number: "Unknown".to_string(),
                }
            });
            let (width, height) = features::sensor_size(&guard)?;
            let exposure0 = features::get_exposure_us(&guard)?;
            let gain0 = features::get_gain_db(&guard)?;
            let frame_rate0 = features::get_frame_rate_hz(&guard)?;
            let gamma0 = nodemap::float_value(&guard, genicam::GAMMA)?;
            let temperature0 = features::device_temperature(&guard).unwrap_or(0.0);
            (
                info, width, height, exposure0, gain0, frame_rate0, gamma0, temperature0,
            )
        };

        // Acquisition group
        let mut exposure_us = Parameter::new("acquisition.exposure_us", exposure0)
            .with_description("Exposure time, clamped to the device range")
            .with_unit("us");

        let mut gain_db = Parameter::new("acquisition.gain_db", gain0)
            .with_description("Sensor gain, clamped to the device range")
            .with_unit("dB");

        let mut frame_rate_hz = Parameter::new("acquisition.frame_rate_hz", frame_rate0)
            .with_description("Free-run acquisition frame rate")
            .with_unit("Hz");

        let mut trigger_mode = Parameter::new(
            "acquisition.trigger_mode",
            TriggerMode::None.as_str().to_string(),
        )
        .with_description("Trigger mode")
        .with_choices_introspectable(TriggerMode::all_choices());

        let streaming =
            Parameter::new("acquisition.streaming", false).with_description("Camera streaming state");

        let armed =
            Parameter::new("acquisition.armed", false).with_description("Camera armed for trigger");

        // Processing group
        let mut gamma = Parameter::new("processing.gamma", gamma0)
            .with_description("Gamma correction factor");

        // Info group
        let temperature_c = Parameter::new("info.device_temperature", temperature0)
            .with_description("Sensor temperature")
            .with_unit("C")
            .read_only();

        let model_name = Parameter::new("info.model_name", info.model_name)
            .with_description("Camera model")
            .read_only();

        let vendor_name = Parameter::new("info.vendor_name", info.vendor_name)
            .with_description("Camera vendor")
            .read_only();

        let serial_number = Parameter::new("info.serial_number", info.serial_number)
            .with_description("Camera serial number")
            .read_only();

        let sensor_width = Parameter::new("sensor.width", width as i64)
            .with_description("Sensor width")
            .with_unit("px")
            .read_only();

        let sensor_height = Parameter::new("sensor.height", height as i64)
            .with_description("Sensor height")
            .with_unit("px")
            .read_only();

        // Wire hardware callbacks before the parameters are shared.
        connect_params(
            &connection,
            &mut exposure_us,
            &mut gain_db,
            &mut frame_rate_hz,
            &mut gamma,
            &mut trigger_mode,
        );

        let mut params = ParameterSet::new();
        params.register(exposure_us.clone());
        params.register(gain_db.clone());
        params.register(frame_rate_hz.clone());
        params.register(gamma.clone());
        params.register(trigger_mode.clone());
        params.register(streaming.clone());
        params.register(armed.clone());
        params.register(temperature_c.clone());
        params.register(model_name);
        params.register(vendor_name);
        params.register(serial_number);
        params.register(sensor_width);
        params.register(sensor_height);

        let acquisition = Arc::new(SpinAcquisition::new(streaming.clone()));

        // Background refresh of drift values.
        let temperature_poll = {
            let temperature = temperature_c.clone();
            let conn = connection.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(TEMPERATURE_POLL_INTERVAL).await;
                    let guard = conn.lock().await;
                    if let Ok(temp) = features::device_temperature(&guard) {
                        temperature.update_from_hardware(temp);
                    }
                }
            })
        };

        Ok(Self {
            camera_name,
            acquisition,
            connection,
            exposure_us,
            gain_db,
            frame_rate_hz,
            gamma,
            trigger_mode,
            streaming,
            armed,
            temperature_c,
            params,
            sensor_width: width,
            sensor_height: height,
            temperature_poll,
        })
    }

    /// Set exposure in microseconds; returns the value the device applied
    /// after clamping.
    pub async fn set_exposure_us(&self, us: f64) -> Result<f64> {
        self.exposure_us.set(us).await?;
        self.exposure_us.read_from_hardware().await?;
        Ok(self.exposure_us.get())
    }

    /// Set gain in dB; returns the applied value.
    pub async fn set_gain_db(&self, db: f64) -> Result<f64> {
        self.gain_db.set(db).await?;
        self.gain_db.read_from_hardware().await?;
        Ok(self.gain_db.get())
    }

    /// Set the free-run frame rate in Hz; returns the applied value.
    pub async fn set_frame_rate_hz(&self, hz: f64) -> Result<f64> {
        self.frame_rate_hz.set(hz).await?;
        self.frame_rate_hz.read_from_hardware().await?;
        Ok(self.frame_rate_hz.get())
    }

    /// Select the trigger configuration.
    pub async fn set_trigger_mode(&self, mode: TriggerMode) -> Result<()> {
        self.trigger_mode.set(mode.as_str().to_string()).await?;
        self.trigger_mode.read_from_hardware().await?;
        Ok(())
    }

    /// The effective trigger configuration.
    pub fn trigger_mode(&self) -> TriggerMode {
        TriggerMode::from_str(&self.trigger_mode.get())
    }

    /// Grab one frame (starting and stopping the stream if it is not
    /// already running).
    pub async fn acquire_frame(&self) -> Result<Frame> {
        self.acquisition.acquire_single_frame(&self.connection).await
    }

    /// Sensor resolution (width, height) in pixels.
    pub fn resolution(&self) -> (u32, u32) {
        (self.sensor_width, self.sensor_height)
    }

    /// Current sensor temperature in Celsius (refreshed in the background).
    pub fn temperature_c(&self) -> f64 {
        self.temperature_c.get()
    }

    /// Gracefully shut the driver down, stopping any active streaming and
    /// the background poll.
    ///
    /// Call before dropping in async contexts; `Drop` cannot block on
    /// async teardown and only performs best-effort cleanup.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::debug!(camera = %self.camera_name, "driver shutdown");
        if self.streaming.get() {
            self.acquisition.stop_stream(&self.connection).await?;
        }
        self.temperature_poll.abort();
        Ok(())
    }
}

/// Connect each writable parameter to its node-map operation.
fn connect_params(
    connection: &Arc<Mutex<SpinConnection>>,
    exposure_us: &mut Parameter<f64>,
    gain_db: &mut Parameter<f64>,
    frame_rate_hz: &mut Parameter<f64>,
    gamma: &mut Parameter<f64>,
    trigger_mode: &mut Parameter<String>,
) {
    exposure_us.connect_to_hardware_write({
        let conn = connection.clone();
        move |val| {
            let conn = conn.clone();
            Box::pin(async move {
                let guard = conn.lock().await;
                features::set_exposure_us(&guard, val)
                    .map(|_| ())
                    .map_err(|e| CamError::Camera(e.to_string()))
            })
        }
    });
    exposure_us.connect_to_hardware_read({
        let conn = connection.clone();
        move || {
            let conn = conn.clone();
            Box::pin(async move {
                let guard = conn.lock().await;
                features::get_exposure_us(&guard).map_err(|e| CamError::Camera(e.to_string()))
            })
        }
    });

    gain_db.connect_to_hardware_write({
        let conn = connection.clone();
        move |val| {
            let conn = conn.clone();
            Box::pin(async move {
                let guard = conn.lock().await;
                features::set_gain_db(&guard, val)
                    .map(|_| ())
                    .map_err(|e| CamError::Camera(e.to_string()))
            })
        }
    });
    gain_db.connect_to_hardware_read({
        let conn = connection.clone();
        move || {
            let conn = conn.clone();
            Box::pin(async move {
                let guard = conn.lock().await;
                features::get_gain_db(&guard).map_err(|e| CamError::Camera(e.to_string()))
            })
        }
    });

    frame_rate_hz.connect_to_hardware_write({
        let conn = connection.clone();
        move |val| {
            let conn = conn.clone();
            Box::pin(async move {
                let guard = conn.lock().await;
                features::set_frame_rate_hz(&guard, val)
                    .map(|_| ())
                    .map_err(|e| CamError::Camera(e.to_string()))
            })
        }
    });
    frame_rate_hz.connect_to_hardware_read({
        let conn = connection.clone();
        move || {
            let conn = conn.clone();
            Box::pin(async move {
                let guard = conn.lock().await;
                features::get_frame_rate_hz(&guard).map_err(|e| CamError::Camera(e.to_string()))
            })
        }
    });

    gamma.connect_to_hardware_write({
        let conn = connection.clone();
        move |val| {
            let conn = conn.clone();
            Box::pin(async move {
                let guard = conn.lock().await;
                features::set_gamma(&guard, val).map_err(|e| CamError::Camera(e.to_string()))
            })
        }
    });
    gamma.connect_to_hardware_read({
        let conn = connection.clone();
        move || {
            let conn = conn.clone();
            Box::pin(async move {
                let guard = conn.lock().await;
                nodemap::float_value(&guard, genicam::GAMMA)
                    .map_err(|e| CamError::Camera(e.to_string()))
            })
        }
    });

    trigger_mode.connect_to_hardware_write({
        let conn = connection.clone();
        move |val| {
            let conn = conn.clone();
            Box::pin(async move {
                let guard = conn.lock().await;
                features::setup_trigger(&guard, TriggerMode::from_str(&val))
                    .map_err(|e| CamError::Camera(e.to_string()))
            })
        }
    });
    trigger_mode.connect_to_hardware_read({
        let conn = connection.clone();
        move || {
            let conn = conn.clone();
            Box::pin(async move {
                let guard = conn.lock().await;
                features::current_trigger(&guard)
                    .map(|m| m.as_str().to_string())
                    .map_err(|e| CamError::Camera(e.to_string()))
            })
        }
    });
}

#[async_trait]
impl ExposureControl for SpinnakerDriver {
    async fn set_exposure(&self, seconds: f64) -> Result<()> {
        self.set_exposure_us(seconds * 1e6).await.map(|_| ())
    }

    async fn get_exposure(&self) -> Result<f64> {
        Ok(self.exposure_us.get() / 1e6)
    }
}

#[async_trait]
impl GainControl for SpinnakerDriver {
    async fn set_gain_db(&self, db: f64) -> Result<()> {
        SpinnakerDriver::set_gain_db(self, db).await.map(|_| ())
    }

    async fn get_gain_db(&self) -> Result<f64> {
        Ok(self.gain_db.get())
    }
}

#[async_trait]
impl FrameRateControl for SpinnakerDriver {
    async fn set_frame_rate(&self, hz: f64) -> Result<()> {
        self.set_frame_rate_hz(hz).await.map(|_| ())
    }

    async fn get_frame_rate(&self) -> Result<f64> {
        Ok(self.frame_rate_hz.get())
    }
}

#[async_trait]
impl Triggerable for SpinnakerDriver {
    async fn arm(&self) -> Result<()> {
        self.armed.set(true).await?;
        Ok(())
    }

    async fn trigger(&self) -> Result<()> {
        let guard = self.connection.lock().await;
        features::execute_software_trigger(&guard)
    }

    async fn is_armed(&self) -> Result<bool> {
        Ok(self.armed.get())
    }
}

#[async_trait]
impl FrameProducer for SpinnakerDriver {
    async fn start_stream(&self) -> Result<()> {
        self.acquisition.start_stream(&self.connection).await
    }

    async fn stop_stream(&self) -> Result<()> {
        self.acquisition.stop_stream(&self.connection).await
    }

    fn resolution(&self) -> (u32, u32) {
        (self.sensor_width, self.sensor_height)
    }

    async fn subscribe_frames(&self) -> Option<broadcast::Receiver<Arc<Frame>>> {
        Some(self.acquisition.frame_tx.subscribe())
    }

    async fn is_streaming(&self) -> Result<bool> {
        Ok(self.streaming.get())
    }

    fn frame_count(&self) -> u64 {
        self.acquisition.frame_count.load(Ordering::SeqCst)
    }
}

impl Parameterized for SpinnakerDriver {
    fn parameters(&self) -> &ParameterSet {
        &self.params
    }
}

/// Best-effort cleanup only: no `block_on` here, it would panic inside an
/// async context. `shutdown().await` is the supported teardown path; the
/// mock/poll tasks exit on their next wakeup once aborted.
impl Drop for SpinnakerDriver {
    fn drop(&mut self) {
        self.temperature_poll.abort();
        if self.streaming.get() {
            tracing::warn!(
                "SpinnakerDriver dropped while streaming was active. \
                 Call driver.shutdown().await before dropping for a clean stop."
            );
        }
    }
}
