//! Acquisition logic: continuous streaming and single-frame grabs.
//!
//! Frames are distributed through a tokio broadcast channel; slow
//! subscribers lag rather than stall the camera. On the hardware path a
//! blocking poll loop pulls images from the SDK; in the default build a
//! mock task synthesizes padded raw frames, paced by the frame-rate node in
//! free-run and gated on the software-trigger notifier when triggering is
//! configured.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use gencam_core::parameter::Parameter;
use gencam_core::{CamError, DriverError, DriverErrorKind, Frame, PixelFormat};

use crate::components::connection::SpinConnection;
use crate::components::convert::{self, RawImage};
use crate::components::features;

#[cfg(not(feature = "spinnaker_sdk"))]
use crate::components::features::TriggerMode;

#[cfg(feature = "spinnaker_sdk")]
use crate::components::connection::{checked_call, CameraHandle};

/// How long a single-frame grab waits before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-image grab timeout handed to the SDK poll call.
#[cfg(feature = "spinnaker_sdk")]
const GRAB_TIMEOUT_MS: u64 = 1000;

/// Poll interval while waiting for trigger signals in the mock stream.
#[cfg(not(feature = "spinnaker_sdk"))]
const MOCK_TRIGGER_POLL: Duration = Duration::from_millis(50);

pub struct SpinAcquisition {
    /// Streaming state, shared with the driver's parameter table.
    pub streaming: Parameter<bool>,
    /// Frames produced since streaming started.
    pub frame_count: Arc<AtomicU64>,
    /// Broadcast of converted frames.
    pub frame_tx: broadcast::Sender<Arc<Frame>>,

    stream_task: Mutex<Option<JoinHandle<()>>>,
}

impl SpinAcquisition {
    pub fn new(streaming: Parameter<bool>) -> Self {
        let (frame_tx, _) = broadcast::channel(16);
        Self {
            streaming,
            frame_count: Arc::new(AtomicU64::new(0)),
            frame_tx,
            stream_task: Mutex::new(None),
        }
    }

    /// Start continuous acquisition.
    pub async fn start_stream(&self, conn: &Arc<Mutex<SpinConnection>>) -> Result<()> {
        if self.streaming.get() {
            return Err(CamError::Driver(DriverError::new(
                "spinnaker",
                DriverErrorKind::Acquisition,
                "already streaming",
            ))
            .into());
        }

        #[cfg(feature = "spinnaker_sdk")]
        {
            let guard = conn.lock().await;
            let camera = guard.camera().ok_or_else(|| anyhow!("camera not open"))?;
            let format = features::pixel_format(&guard)?;
            checked_call!(
                spinnaker_sys::spinCameraBeginAcquisition(camera.0),
                "spinCameraBeginAcquisition"
            );
            drop(guard);

            self.streaming.set(true).await?;
            self.frame_count.store(0, Ordering::SeqCst);

            let streaming = self.streaming.clone();
            let frame_tx = self.frame_tx.clone();
            let frame_count = self.frame_count.clone();
            let handle = tokio::task::spawn_blocking(move || {
                poll_loop_hardware(camera, format, streaming, frame_tx, frame_count);
            });
            *self.stream_task.lock().await = Some(handle);
        }

        #[cfg(not(feature = "spinnaker_sdk"))]
        {
            self.streaming.set(true).await?;
            self.frame_count.store(0, Ordering::SeqCst);

            let conn = conn.clone();
            let streaming = self.streaming.clone();
            let frame_tx = self.frame_tx.clone();
            let frame_count = self.frame_count.clone();
            let handle = tokio::spawn(async move {
                run_mock_stream(conn, streaming, frame_tx, frame_count).await;
            });
            *self.stream_task.lock().await = Some(handle);
        }

        tracing::info!("acquisition started");
        Ok(())
    }

    /// Stop continuous acquisition. Idempotent.
    pub async fn stop_stream(&self, conn: &Arc<Mutex<SpinConnection>>) -> Result<()> {
        if !self.streaming.get() {
            return Ok(());
        }
        self.streaming.set(false).await?;

        if let Some(handle) = self.stream_task.lock().await.take() {
            let _ = handle.await;
        }

        #[cfg(feature = "spinnaker_sdk")]
        {
            let guard = conn.lock().await;
            if let Some(camera) = guard.camera() {
                // SAFETY: camera is open; the poll loop has exited, so no
                // grab is in flight.
                unsafe {
                    spinnaker_sys::spinCameraEndAcquisition(camera.0);
                }
            }
        }
        #[cfg(not(feature = "spinnaker_sdk"))]
        let _ = conn;

        tracing::info!("acquisition stopped");
        Ok(())
    }

    /// Grab one frame.
    ///
    /// If the camera is already streaming, returns the next frame off the
    /// broadcast; otherwise starts the stream, waits for one frame and
    /// stops again (the original one-shot capture behavior).
    pub async fn acquire_single_frame(&self, conn: &Arc<Mutex<SpinConnection>>) -> Result<Frame> {
        let mut rx = self.frame_tx.subscribe();

        let started_here = if self.streaming.get() {
            false
        } else {
            self.start_stream(conn).await?;
            true
        };

        let result = timeout(ACQUIRE_TIMEOUT, rx.recv()).await;

        if started_here {
            let _ = self.stop_stream(conn).await;
        }

        let frame = result
            .map_err(|_| CamError::Timeout("waiting for frame".to_string()))?
            .map_err(|e| anyhow!("frame channel closed: {e}"))?;
        Ok((*frame).clone())
    }
}

// =============================================================================
// Mock stream (default build)
// =============================================================================

#[cfg(not(feature = "spinnaker_sdk"))]
async fn run_mock_stream(
    conn: Arc<Mutex<SpinConnection>>,
    streaming: Parameter<bool>,
    frame_tx: broadcast::Sender<Arc<Frame>>,
    frame_count: Arc<AtomicU64>,
) {
    let mut stop_rx = streaming.subscribe();

    loop {
        if !streaming.get() {
            break;
        }

        // Snapshot the device state that shapes this frame.
        let (fps, trigger, (width, height), format, notify) = {
            let guard = conn.lock().await;
            let fps = features::get_frame_rate_hz(&guard).unwrap_or(30.0);
            let trigger = features::current_trigger(&guard).unwrap_or(TriggerMode::None);
            let dims = features::sensor_size(&guard).unwrap_or((640, 480));
            let format = features::pixel_format(&guard).unwrap_or(PixelFormat::Mono8);
            let notify = guard.mock_state().software_trigger.clone();
            (fps, trigger, dims, format, notify)
        };

        match trigger {
            TriggerMode::Software => {
                // Wake periodically to notice stream shutdown.
                if timeout(MOCK_TRIGGER_POLL, notify.notified()).await.is_err() {
                    continue;
                }
            }
            TriggerMode::Hardware => {
                // No line signal exists in the mock; frames never fire.
                tokio::time::sleep(MOCK_TRIGGER_POLL).await;
                continue;
            }
            TriggerMode::None => {
                let period = Duration::from_secs_f64(1.0 / fps.clamp(0.1, 10_000.0));
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = stop_rx.changed() => {}
                }
            }
        }

        if !streaming.get() {
            break;
        }

        let frame_id = frame_count.fetch_add(1, Ordering::SeqCst);
        let raw = synthetic_raw(width, height, format, frame_id);
        match convert::unpack(&raw) {
            Ok(frame) => {
                let _ = frame_tx.send(Arc::new(frame));
            }
            Err(e) => tracing::warn!("mock frame conversion failed: {e}"),
        }
    }
}

/// Build one synthetic transport buffer: a moving gradient with the
/// stride/padding geometry a real transport produces, so the conversion
/// path is exercised by every mock frame.
#[cfg(not(feature = "spinnaker_sdk"))]
fn synthetic_raw(width: u32, height: u32, format: PixelFormat, frame_id: u64) -> RawImage {
    const TRANSPORT_ALIGN: usize = 64;

    let bpp = format.bytes_per_pixel();
    let packed_row = width as usize * bpp;
    let stride = packed_row.div_ceil(TRANSPORT_ALIGN) * TRANSPORT_ALIGN;
    let y_padding = 1u32;

    let mut data = vec![0u8; stride * (height + y_padding) as usize];
    for y in 0..height {
        let row = y as usize * stride;
        match format {
            PixelFormat::Mono8 => {
                for x in 0..width {
                    data[row + x as usize] = ((x as u64 + y as u64 + frame_id) % 256) as u8;
                }
            }
            PixelFormat::Mono16 => {
                for x in 0..width {
                    let value = (((x as u64 + y as u64 + frame_id) % 4096) + 100) as u16;
                    let offset = row + x as usize * 2;
                    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
                }
            }
        }
    }

    RawImage {
        width,
        height,
        stride,
        x_padding: ((stride - packed_row) / bpp) as u32,
        y_padding,
        format,
        frame_id,
        data,
    }
}

// =============================================================================
// Hardware poll loop (spinnaker_sdk)
// =============================================================================

#[cfg(feature = "spinnaker_sdk")]
fn poll_loop_hardware(
    camera: CameraHandle,
    format: PixelFormat,
    streaming: Parameter<bool>,
    frame_tx: broadcast::Sender<Arc<Frame>>,
    frame_count: Arc<AtomicU64>,
) {
    while streaming.get() {
        match grab_next_raw(camera, format, GRAB_TIMEOUT_MS) {
            Ok(Some(mut raw)) => {
                raw.frame_id = frame_count.fetch_add(1, Ordering::SeqCst);
                match convert::unpack(&raw) {
                    Ok(frame) => {
                        let _ = frame_tx.send(Arc::new(frame));
                    }
                    Err(e) => tracing::warn!("frame conversion failed: {e}"),
                }
            }
            // Grab timeout or incomplete image: poll again.
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("image grab failed, stopping poll loop: {e}");
                break;
            }
        }
    }
}

/// Pull the next image off the SDK, copy the padded payload out and hand
/// the raw image pointer straight back to the SDK.
#[cfg(feature = "spinnaker_sdk")]
fn grab_next_raw(
    camera: CameraHandle,
    format: PixelFormat,
    timeout_ms: u64,
) -> Result<Option<RawImage>> {
    /// Raw image pointers obtained from a capture call must be released
    /// back to the SDK after use; the guard ties that to scope exit.
    struct ImageGuard(spinnaker_sys::spinImage);
    impl Drop for ImageGuard {
        fn drop(&mut self) {
            // SAFETY: handle came from spinCameraGetNextImageEx on this camera.
            #[allow(unsafe_code)]
            unsafe {
                spinnaker_sys::spinImageRelease(self.0);
            }
        }
    }

    let mut image: spinnaker_sys::spinImage = std::ptr::null_mut();
    // SAFETY: camera is streaming; image is a valid out pointer.
    let grabbed =
        unsafe { spinnaker_sys::spinCameraGetNextImageEx(camera.0, timeout_ms, &mut image) };
    if grabbed != spinnaker_sys::_spinError::SPINNAKER_ERR_SUCCESS || image.is_null() {
        // Timeout while waiting for the next frame; not fatal.
        return Ok(None);
    }
    let image = ImageGuard(image);

    let mut incomplete: spinnaker_sys::bool8_t = 0;
    checked_call!(
        spinnaker_sys::spinImageIsIncomplete(image.0, &mut incomplete),
        "spinImageIsIncomplete"
    );
    if incomplete != 0 {
        return Ok(None);
    }

    let mut width: spinnaker_sys::size_t = 0;
    let mut height: spinnaker_sys::size_t = 0;
    let mut stride: spinnaker_sys::size_t = 0;
    let mut buffer_size: spinnaker_sys::size_t = 0;
    let mut data_ptr: *mut std::os::raw::c_void = std::ptr::null_mut();
    checked_call!(
        spinnaker_sys::spinImageGetWidth(image.0, &mut width),
        "spinImageGetWidth"
    );
    checked_call!(
        spinnaker_sys::spinImageGetHeight(image.0, &mut height),
        "spinImageGetHeight"
    );
    checked_call!(
        spinnaker_sys::spinImageGetStride(image.0, &mut stride),
        "spinImageGetStride"
    );
    checked_call!(
        spinnaker_sys::spinImageGetBufferSize(image.0, &mut buffer_size),
        "spinImageGetBufferSize"
    );
    checked_call!(
        spinnaker_sys::spinImageGetData(image.0, &mut data_ptr),
        "spinImageGetData"
    );

    let width = width as u32;
    let height = height as u32;
    let stride = stride as usize;
    let buffer_size = buffer_size as usize;
    let bpp = format.bytes_per_pixel();

    // Copy out before the guard releases the SDK buffer.
    // SAFETY: data_ptr points to at least buffer_size bytes while the image
    // handle is held.
    let data =
        unsafe { std::slice::from_raw_parts(data_ptr as *const u8, buffer_size) }.to_vec();
    drop(image);

    let x_padding = (stride / bpp).saturating_sub(width as usize) as u32;
    let y_padding = (buffer_size / stride.max(1)).saturating_sub(height as usize) as u32;

    Ok(Some(RawImage {
        width,
        height,
        stride,
        x_padding,
        y_padding,
        format,
        frame_id: 0, // assigned by the poll loop
        data,
    }))
}
