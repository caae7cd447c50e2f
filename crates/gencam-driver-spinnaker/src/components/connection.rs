//! Spinnaker connection management.
//!
//! Handles system-handle acquisition, camera opening/closing and resource
//! cleanup.
//!
//! ## System handle reference counting
//!
//! The Spinnaker SDK hands out a process-global system instance:
//! `spinSystemGetInstance()` / `spinSystemReleaseInstance()` affect the
//! whole process. To support multiple `SpinnakerDriver` instances, a global
//! reference counter gates those calls: the system is acquired by the first
//! connection and released when the last one closes.

use anyhow::Result;

#[cfg(feature = "spinnaker_sdk")]
use anyhow::anyhow;
#[cfg(feature = "spinnaker_sdk")]
use std::ffi::CString;
#[cfg(feature = "spinnaker_sdk")]
use std::sync::atomic::{AtomicU32, Ordering};
#[cfg(feature = "spinnaker_sdk")]
use std::sync::Mutex;

#[cfg(not(feature = "spinnaker_sdk"))]
use std::collections::HashMap;
#[cfg(not(feature = "spinnaker_sdk"))]
use std::sync::Arc;

#[cfg(not(feature = "spinnaker_sdk"))]
use crate::components::nodemap::{flir, genicam};

/// Global reference counter for the Spinnaker system instance.
#[cfg(feature = "spinnaker_sdk")]
static SYSTEM_REF_COUNT: AtomicU32 = AtomicU32::new(0);

/// Mutex to make acquire-and-count / release-and-count atomic.
#[cfg(feature = "spinnaker_sdk")]
static SYSTEM_INIT_MUTEX: Mutex<()> = Mutex::new(());

/// Process-wide system handle, valid while SYSTEM_REF_COUNT > 0.
#[cfg(feature = "spinnaker_sdk")]
static SYSTEM_HANDLE: Mutex<Option<SystemHandle>> = Mutex::new(None);

/// Checks a SpinnakerC return code, converting failures into `CamError`.
#[cfg(feature = "spinnaker_sdk")]
macro_rules! checked_call {
    ($call:expr, $what:expr) => {
        // SAFETY: caller guarantees the handles passed to the SDK call are
        // valid; out-pointers reference live stack locals.
        match unsafe { $call } {
            spinnaker_sys::_spinError::SPINNAKER_ERR_SUCCESS => {}
            err => {
                return Err(gencam_core::CamError::Camera(format!(
                    "{} failed with Spinnaker error {:?}",
                    $what, err
                ))
                .into())
            }
        }
    };
}

#[cfg(feature = "spinnaker_sdk")]
pub(crate) use checked_call;

/// Raw SDK handle wrappers. SpinnakerC handles are opaque pointers that the
/// SDK documents as safe to use across threads, which the newtypes assert.
#[cfg(feature = "spinnaker_sdk")]
#[derive(Clone, Copy)]
pub(crate) struct SystemHandle(pub(crate) spinnaker_sys::spinSystem);
#[cfg(feature = "spinnaker_sdk")]
#[allow(unsafe_code)]
// SAFETY: Spinnaker system handles are process-global and thread-safe per SDK docs.
unsafe impl Send for SystemHandle {}
#[cfg(feature = "spinnaker_sdk")]
#[allow(unsafe_code)]
// SAFETY: see Send impl above.
unsafe impl Sync for SystemHandle {}

#[cfg(feature = "spinnaker_sdk")]
#[derive(Clone, Copy)]
pub(crate) struct CameraHandle(pub(crate) spinnaker_sys::spinCamera);
#[cfg(feature = "spinnaker_sdk")]
#[allow(unsafe_code)]
// SAFETY: Spinnaker camera handles may be used from any thread; concurrent
// access is serialized by the connection mutex in the driver.
unsafe impl Send for CameraHandle {}
#[cfg(feature = "spinnaker_sdk")]
#[allow(unsafe_code)]
// SAFETY: see Send impl above.
unsafe impl Sync for CameraHandle {}

// =============================================================================
// Mock device model (default build, no SDK required)
// =============================================================================

/// One float node of the mock device: current value plus the bounds the
/// device would report.
#[cfg(not(feature = "spinnaker_sdk"))]
#[derive(Debug, Clone)]
pub struct MockFloatNode {
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

#[cfg(not(feature = "spinnaker_sdk"))]
impl MockFloatNode {
    fn new(value: f64, min: f64, max: f64) -> Self {
        Self { value, min, max }
    }
}

/// One enumeration node: current symbolic entry plus the entry list.
#[cfg(not(feature = "spinnaker_sdk"))]
#[derive(Debug, Clone)]
pub struct MockEnumNode {
    pub current: String,
    pub entries: Vec<&'static str>,
}

#[cfg(not(feature = "spinnaker_sdk"))]
impl MockEnumNode {
    fn new(current: &str, entries: &[&'static str]) -> Self {
        Self {
            current: current.to_string(),
            entries: entries.to_vec(),
        }
    }
}

/// In-memory node table standing in for a Blackfly-class device.
///
/// Bounds follow a BFS-U3-28S5M: exposure 12 us - 30 s, gain 0 - 47.99 dB,
/// frame rate up to 170 Hz, 1936x1464 Mono8 sensor.
#[cfg(not(feature = "spinnaker_sdk"))]
#[derive(Debug, Clone)]
pub struct MockDeviceState {
    pub floats: HashMap<&'static str, MockFloatNode>,
    pub ints: HashMap<&'static str, i64>,
    pub bools: HashMap<&'static str, bool>,
    pub enums: HashMap<&'static str, MockEnumNode>,
    pub strings: HashMap<&'static str, String>,
    /// Signalled by the `TriggerSoftware` command node; the mock stream
    /// waits on it while software triggering is configured.
    pub software_trigger: Arc<tokio::sync::Notify>,
}

#[cfg(not(feature = "spinnaker_sdk"))]
impl Default for MockDeviceState {
    fn default() -> Self {
        let mut floats = HashMap::new();
        floats.insert(
            genicam::EXPOSURE_TIME,
            MockFloatNode::new(15000.0, 12.0, 30_000_000.0),
        );
        floats.insert(genicam::GAIN, MockFloatNode::new(0.0, 0.0, 47.99));
        floats.insert(
            genicam::ACQUISITION_FRAME_RATE,
            MockFloatNode::new(30.0, 1.0, 170.0),
        );
        floats.insert(genicam::GAMMA, MockFloatNode::new(0.8, 0.25, 4.0));
        floats.insert(
            genicam::DEVICE_TEMPERATURE,
            MockFloatNode::new(38.5, -20.0, 100.0),
        );

        let mut ints = HashMap::new();
        ints.insert(genicam::WIDTH, 1936);
        ints.insert(genicam::HEIGHT, 1464);

        let mut bools = HashMap::new();
        bools.insert(flir::ACQUISITION_FRAME_RATE_ENABLE, false);

        let mut enums = HashMap::new();
        enums.insert(
            genicam::EXPOSURE_AUTO,
            MockEnumNode::new("Continuous", &["Off", "Once", "Continuous"]),
        );
        enums.insert(
            genicam::GAIN_AUTO,
            MockEnumNode::new("Continuous", &["Off", "Once", "Continuous"]),
        );
        enums.insert(
            genicam::ACQUISITION_MODE,
            MockEnumNode::new(
                "Continuous",
                &["Continuous", "SingleFrame", "MultiFrame"],
            ),
        );
        enums.insert(
            genicam::TRIGGER_MODE,
            MockEnumNode::new("Off", &["Off", "On"]),
        );
        enums.insert(
            genicam::TRIGGER_SELECTOR,
            MockEnumNode::new("FrameStart", &["FrameStart", "AcquisitionStart"]),
        );
        enums.insert(
            genicam::TRIGGER_SOURCE,
            MockEnumNode::new(
                "Software",
                &["Software", "Line0", "Line1", "Line2", "Line3"],
            ),
        );
        enums.insert(
            genicam::PIXEL_FORMAT,
            MockEnumNode::new("Mono8", &["Mono8", "Mono16"]),
        );

        let mut strings = HashMap::new();
        strings.insert(
            genicam::DEVICE_MODEL_NAME,
            "Blackfly S BFS-U3-28S5M".to_string(),
        );
        strings.insert(genicam::DEVICE_VENDOR_NAME, "FLIR".to_string());
        strings.insert(genicam::DEVICE_SERIAL_NUMBER, "22421982".to_string());

        Self {
            floats,
            ints,
            bools,
            enums,
            strings,
            software_trigger: Arc::new(tokio::sync::Notify::new()),
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Manages the connection to the Spinnaker system and one camera.
#[derive(Default)]
pub struct SpinConnection {
    #[cfg(feature = "spinnaker_sdk")]
    camera: Option<CameraHandle>,
    #[cfg(feature = "spinnaker_sdk")]
    system_acquired: bool,

    /// Mock device table used when the SDK feature is disabled.
    #[cfg(not(feature = "spinnaker_sdk"))]
    mock: std::sync::Mutex<MockDeviceState>,
}

impl SpinConnection {
    /// Create a new, unconnected connection manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the mock device table, recovering from poisoning (the table
    /// must stay reachable so release/cleanup paths keep working).
    #[cfg(not(feature = "spinnaker_sdk"))]
    pub(crate) fn mock_state(&self) -> std::sync::MutexGuard<'_, MockDeviceState> {
        match self.mock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Acquire the Spinnaker system instance (reference counted).
    #[cfg(feature = "spinnaker_sdk")]
    pub fn initialize(&mut self) -> Result<()> {
        if self.system_acquired {
            return Ok(());
        }

        let _guard = match SYSTEM_INIT_MUTEX.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("system init mutex poisoned during initialize - recovering");
                poisoned.into_inner()
            }
        };

        let prev_count = SYSTEM_REF_COUNT.fetch_add(1, Ordering::SeqCst);
        if prev_count == 0 {
            let mut handle: spinnaker_sys::spinSystem = std::ptr::null_mut();
            // SAFETY: handle is a valid out pointer; guarded by SYSTEM_INIT_MUTEX.
            match unsafe { spinnaker_sys::spinSystemGetInstance(&mut handle) } {
                spinnaker_sys::_spinError::SPINNAKER_ERR_SUCCESS => {}
                err => {
                    SYSTEM_REF_COUNT.fetch_sub(1, Ordering::SeqCst);
                    return Err(anyhow!("failed to acquire Spinnaker system: {:?}", err));
                }
            }
            *system_handle_slot() = Some(SystemHandle(handle));
            tracing::info!("Spinnaker system acquired (ref count: 1)");
        } else {
            tracing::debug!(
                "Spinnaker system already acquired (ref count: {})",
                prev_count + 1
            );
        }

        self.system_acquired = true;
        Ok(())
    }

    /// Open a camera by serial number.
    ///
    /// Falls back to the first enumerated camera when the serial is not
    /// found, matching common bench usage with a single attached device.
    #[cfg(feature = "spinnaker_sdk")]
    pub fn open(&mut self, serial: &str) -> Result<()> {
        if !self.system_acquired {
            return Err(anyhow!("Spinnaker system not acquired"));
        }
        if self.camera.is_some() {
            return Ok(()); // Already open
        }

        let system = (*system_handle_slot())
            .ok_or_else(|| anyhow!("Spinnaker system handle missing"))?;

        let mut camera_list: spinnaker_sys::spinCameraList = std::ptr::null_mut();
        checked_call!(
            spinnaker_sys::spinCameraListCreateEmpty(&mut camera_list),
            "spinCameraListCreateEmpty"
        );
        checked_call!(
            spinnaker_sys::spinSystemGetCameras(system.0, camera_list),
            "spinSystemGetCameras"
        );

        let mut count: spinnaker_sys::size_t = 0;
        checked_call!(
            spinnaker_sys::spinCameraListGetSize(camera_list, &mut count),
            "spinCameraListGetSize"
        );
        if count == 0 {
            // SAFETY: camera_list was created above and is still owned here.
            unsafe {
                spinnaker_sys::spinCameraListClear(camera_list);
                spinnaker_sys::spinCameraListDestroy(camera_list);
            }
            return Err(anyhow!("no Spinnaker cameras detected"));
        }

        let serial_cstr = CString::new(serial)?;
        let mut camera: spinnaker_sys::spinCamera = std::ptr::null_mut();
        // SAFETY: camera_list is valid; serial_cstr outlives the call.
        let by_serial = unsafe {
            spinnaker_sys::spinCameraListGetBySerial(
                camera_list,
                serial_cstr.as_ptr(),
                &mut camera,
            )
        };
        if by_serial != spinnaker_sys::_spinError::SPINNAKER_ERR_SUCCESS || camera.is_null() {
            tracing::warn!(
                serial,
                "camera with requested serial not found - using first camera"
            );
            checked_call!(
                spinnaker_sys::spinCameraListGet(camera_list, 0, &mut camera),
                "spinCameraListGet"
            );
        }

        // The list only needed to resolve the camera handle.
        // SAFETY: camera_list is valid; the camera handle holds its own reference.
        unsafe {
            spinnaker_sys::spinCameraListClear(camera_list);
            spinnaker_sys::spinCameraListDestroy(camera_list);
        }

        checked_call!(spinnaker_sys::spinCameraInit(camera), "spinCameraInit");

        self.camera = Some(CameraHandle(camera));
        tracing::info!(serial, "camera opened and initialized");
        Ok(())
    }

    /// Close the camera if open.
    #[cfg(feature = "spinnaker_sdk")]
    pub fn close(&mut self) {
        if let Some(camera) = self.camera.take() {
            // SAFETY: camera was opened by this connection and is still owned.
            unsafe {
                spinnaker_sys::spinCameraDeInit(camera.0);
                spinnaker_sys::spinCameraRelease(camera.0);
            }
        }
    }

    /// Release the system instance (reference counted).
    #[cfg(feature = "spinnaker_sdk")]
    pub fn uninitialize(&mut self) {
        self.close();

        if !self.system_acquired {
            return;
        }
        self.system_acquired = false;

        let _guard = match SYSTEM_INIT_MUTEX.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("system init mutex poisoned during uninitialize - recovering");
                poisoned.into_inner()
            }
        };

        let prev_count = SYSTEM_REF_COUNT.fetch_sub(1, Ordering::SeqCst);
        if prev_count == 1 {
            if let Some(system) = system_handle_slot().take() {
                // SAFETY: last reference; handle came from spinSystemGetInstance.
                unsafe {
                    spinnaker_sys::spinSystemReleaseInstance(system.0);
                }
            }
            tracing::info!("Spinnaker system released (last connection closed)");
        } else if prev_count == 0 {
            tracing::error!("Spinnaker system ref count underflow - this indicates a bug");
            SYSTEM_REF_COUNT.store(0, Ordering::SeqCst);
        } else {
            tracing::debug!("Spinnaker system still in use (ref count: {})", prev_count - 1);
        }
    }

    /// Get the open camera handle.
    #[cfg(feature = "spinnaker_sdk")]
    pub(crate) fn camera(&self) -> Option<CameraHandle> {
        self.camera
    }

    /// List serial numbers of all attached cameras.
    #[cfg(feature = "spinnaker_sdk")]
    pub fn list_available_cameras() -> Result<Vec<String>> {
        if SYSTEM_REF_COUNT.load(Ordering::SeqCst) == 0 {
            return Err(anyhow!(
                "Spinnaker system not acquired. Call initialize() first."
            ));
        }
        let system = (*system_handle_slot())
            .ok_or_else(|| anyhow!("Spinnaker system handle missing"))?;

        let mut camera_list: spinnaker_sys::spinCameraList = std::ptr::null_mut();
        checked_call!(
            spinnaker_sys::spinCameraListCreateEmpty(&mut camera_list),
            "spinCameraListCreateEmpty"
        );
        checked_call!(
            spinnaker_sys::spinSystemGetCameras(system.0, camera_list),
            "spinSystemGetCameras"
        );
        let mut count: spinnaker_sys::size_t = 0;
        checked_call!(
            spinnaker_sys::spinCameraListGetSize(camera_list, &mut count),
            "spinCameraListGetSize"
        );

        let mut serials = Vec::with_capacity(count as usize);
        for i in 0..count {
            let mut camera: spinnaker_sys::spinCamera = std::ptr::null_mut();
            // SAFETY: index is within the enumerated list size.
            if unsafe { spinnaker_sys::spinCameraListGet(camera_list, i, &mut camera) }
                != spinnaker_sys::_spinError::SPINNAKER_ERR_SUCCESS
            {
                continue;
            }
            match crate::components::nodemap::device_serial(CameraHandle(camera)) {
                Ok(serial) => serials.push(serial),
                Err(e) => tracing::warn!("failed to read serial for camera {}: {}", i, e),
            }
            // SAFETY: camera came from spinCameraListGet above.
            unsafe {
                spinnaker_sys::spinCameraRelease(camera);
            }
        }

        // SAFETY: camera_list was created in this function.
        unsafe {
            spinnaker_sys::spinCameraListClear(camera_list);
            spinnaker_sys::spinCameraListDestroy(camera_list);
        }
        Ok(serials)
    }

    /// List all available cameras (mock mode).
    #[cfg(not(feature = "spinnaker_sdk"))]
    pub fn list_available_cameras() -> Result<Vec<String>> {
        Ok(vec!["22421982".to_string()])
    }
}

#[cfg(feature = "spinnaker_sdk")]
fn system_handle_slot() -> std::sync::MutexGuard<'static, Option<SystemHandle>> {
    match SYSTEM_HANDLE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(feature = "spinnaker_sdk")]
impl Drop for SpinConnection {
    fn drop(&mut self) {
        self.uninitialize();
    }
}
