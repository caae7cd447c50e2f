//! GenICam device node map access.
//!
//! The node map is the camera's generic key-value property interface:
//! every device setting is a named node (float, integer, boolean,
//! enumeration or command) read and written through the same handful of
//! calls. The accessors here are faithful pass-throughs - value policy such
//! as clamping to device bounds lives in the feature layer, not here.
//!
//! With the `spinnaker_sdk` feature each accessor maps onto the SpinnakerC
//! node-map API; in the default build they operate on the connection's mock
//! device table, erroring the same way the SDK would for unknown nodes,
//! unknown enum entries and out-of-range writes.

use anyhow::Result;
use gencam_core::CamError;

use crate::components::connection::SpinConnection;

#[cfg(feature = "spinnaker_sdk")]
use crate::components::connection::{checked_call, CameraHandle};
#[cfg(feature = "spinnaker_sdk")]
use anyhow::anyhow;
#[cfg(feature = "spinnaker_sdk")]
use std::ffi::CString;

/// Common GenICam feature names (Standard Features Naming Convention).
pub mod genicam {
    pub const ACQUISITION_FRAME_RATE: &str = "AcquisitionFrameRate";
    pub const ACQUISITION_MODE: &str = "AcquisitionMode";
    pub const DEVICE_MODEL_NAME: &str = "DeviceModelName";
    pub const DEVICE_SERIAL_NUMBER: &str = "DeviceSerialNumber";
    pub const DEVICE_TEMPERATURE: &str = "DeviceTemperature";
    pub const DEVICE_VENDOR_NAME: &str = "DeviceVendorName";
    pub const EXPOSURE_AUTO: &str = "ExposureAuto";
    pub const EXPOSURE_TIME: &str = "ExposureTime";
    pub const GAIN: &str = "Gain";
    pub const GAIN_AUTO: &str = "GainAuto";
    pub const GAMMA: &str = "Gamma";
    pub const HEIGHT: &str = "Height";
    pub const PIXEL_FORMAT: &str = "PixelFormat";
    pub const TRIGGER_MODE: &str = "TriggerMode";
    pub const TRIGGER_SELECTOR: &str = "TriggerSelector";
    pub const TRIGGER_SOFTWARE: &str = "TriggerSoftware";
    pub const TRIGGER_SOURCE: &str = "TriggerSource";
    pub const WIDTH: &str = "Width";
}

/// FLIR-specific feature names seen on Blackfly-class cameras.
pub mod flir {
    pub const ACQUISITION_FRAME_RATE_ENABLE: &str = "AcquisitionFrameRateEnable";
}

// =============================================================================
// Hardware helpers
// =============================================================================

/// Resolve a node handle on the camera's GenICam node map.
#[cfg(feature = "spinnaker_sdk")]
fn node_handle(
    camera: CameraHandle,
    name: &str,
) -> Result<spinnaker_sys::spinNodeHandle> {
    let mut node_map: spinnaker_sys::spinNodeMapHandle = std::ptr::null_mut();
    checked_call!(
        spinnaker_sys::spinCameraGetNodeMap(camera.0, &mut node_map),
        "spinCameraGetNodeMap"
    );

    let name_cstr = CString::new(name)?;
    let mut node: spinnaker_sys::spinNodeHandle = std::ptr::null_mut();
    checked_call!(
        spinnaker_sys::spinNodeMapGetNode(node_map, name_cstr.as_ptr(), &mut node),
        "spinNodeMapGetNode"
    );

    let mut available: spinnaker_sys::bool8_t = 0;
    checked_call!(
        spinnaker_sys::spinNodeIsAvailable(node, &mut available),
        "spinNodeIsAvailable"
    );
    if available == 0 {
        return Err(CamError::NodeNotFound(name.to_string()).into());
    }
    Ok(node)
}

#[cfg(feature = "spinnaker_sdk")]
fn camera_of(conn: &SpinConnection) -> Result<CameraHandle> {
    conn.camera()
        .ok_or_else(|| anyhow!("camera not open"))
}

/// Read a string register from an opened camera (used during enumeration,
/// before a connection object owns the handle).
#[cfg(feature = "spinnaker_sdk")]
pub(crate) fn device_serial(camera: CameraHandle) -> Result<String> {
    let node = node_handle(camera, genicam::DEVICE_SERIAL_NUMBER)?;
    read_node_string(node, genicam::DEVICE_SERIAL_NUMBER)
}

#[cfg(feature = "spinnaker_sdk")]
fn read_node_string(node: spinnaker_sys::spinNodeHandle, name: &str) -> Result<String> {
    const MAX_BUF_LEN: usize = 256;
    let mut buf = [0i8; MAX_BUF_LEN];
    let mut len: spinnaker_sys::size_t = MAX_BUF_LEN as spinnaker_sys::size_t;
    checked_call!(
        spinnaker_sys::spinStringGetValue(node, buf.as_mut_ptr(), &mut len),
        name
    );
    // SAFETY: the SDK wrote a NUL-terminated string into buf.
    let value = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    Ok(value)
}

// =============================================================================
// Float nodes
// =============================================================================

/// Read a float node's current value.
pub fn float_value(conn: &SpinConnection, name: &str) -> Result<f64> {
    #[cfg(feature = "spinnaker_sdk")]
    {
        let node = node_handle(camera_of(conn)?, name)?;
        let mut value: f64 = 0.0;
        checked_call!(spinnaker_sys::spinFloatGetValue(node, &mut value), name);
        Ok(value)
    }
    #[cfg(not(feature = "spinnaker_sdk"))]
    {
        let state = conn.mock_state();
        state
            .floats
            .get(name)
            .map(|n| n.value)
            .ok_or_else(|| CamError::NodeNotFound(name.to_string()).into())
    }
}

/// Read a float node's device-reported bounds as (min, max).
pub fn float_bounds(conn: &SpinConnection, name: &str) -> Result<(f64, f64)> {
    #[cfg(feature = "spinnaker_sdk")]
    {
        let node = node_handle(camera_of(conn)?, name)?;
        let mut min: f64 = 0.0;
        let mut max: f64 = 0.0;
        checked_call!(spinnaker_sys::spinFloatGetMin(node, &mut min), name);
        checked_call!(spinnaker_sys::spinFloatGetMax(node, &mut max), name);
        Ok((min, max))
    }
    #[cfg(not(feature = "spinnaker_sdk"))]
    {
        let state = conn.mock_state();
        state
            .floats
            .get(name)
            .map(|n| (n.min, n.max))
            .ok_or_else(|| CamError::NodeNotFound(name.to_string()).into())
    }
}

/// Write a float node. The device rejects values outside the node's bounds;
/// callers that want clamping go through the feature layer.
pub fn set_float(conn: &SpinConnection, name: &str, value: f64) -> Result<()> {
    tracing::trace!(node = name, value, "node write");
    #[cfg(feature = "spinnaker_sdk")]
    {
        let node = node_handle(camera_of(conn)?, name)?;
        checked_call!(spinnaker_sys::spinFloatSetValue(node, value), name);
        Ok(())
    }
    #[cfg(not(feature = "spinnaker_sdk"))]
    {
        let mut state = conn.mock_state();
        let node = state
            .floats
            .get_mut(name)
            .ok_or_else(|| CamError::NodeNotFound(name.to_string()))?;
        if !value.is_finite() || value < node.min || value > node.max {
            return Err(CamError::NodeOutOfRange {
                node: name.to_string(),
                value,
                min: node.min,
                max: node.max,
            }
            .into());
        }
        node.value = value;
        Ok(())
    }
}

// =============================================================================
// Integer nodes
// =============================================================================

/// Read an integer node's current value.
pub fn int_value(conn: &SpinConnection, name: &str) -> Result<i64> {
    #[cfg(feature = "spinnaker_sdk")]
    {
        let node = node_handle(camera_of(conn)?, name)?;
        let mut value: i64 = 0;
        checked_call!(spinnaker_sys::spinIntegerGetValue(node, &mut value), name);
        Ok(value)
    }
    #[cfg(not(feature = "spinnaker_sdk"))]
    {
        let state = conn.mock_state();
        state
            .ints
            .get(name)
            .copied()
            .ok_or_else(|| CamError::NodeNotFound(name.to_string()).into())
    }
}

// =============================================================================
// Boolean nodes
// =============================================================================

/// Read a boolean node's current value.
pub fn bool_value(conn: &SpinConnection, name: &str) -> Result<bool> {
    #[cfg(feature = "spinnaker_sdk")]
    {
        let node = node_handle(camera_of(conn)?, name)?;
        let mut value: spinnaker_sys::bool8_t = 0;
        checked_call!(spinnaker_sys::spinBooleanGetValue(node, &mut value), name);
        Ok(value != 0)
    }
    #[cfg(not(feature = "spinnaker_sdk"))]
    {
        let state = conn.mock_state();
        state
            .bools
            .get(name)
            .copied()
            .ok_or_else(|| CamError::NodeNotFound(name.to_string()).into())
    }
}

/// Write a boolean node.
pub fn set_bool(conn: &SpinConnection, name: &str, value: bool) -> Result<()> {
    tracing::trace!(node = name, value, "node write");
    #[cfg(feature = "spinnaker_sdk")]
    {
        let node = node_handle(camera_of(conn)?, name)?;
        checked_call!(
            spinnaker_sys::spinBooleanSetValue(node, value as spinnaker_sys::bool8_t),
            name
        );
        Ok(())
    }
    #[cfg(not(feature = "spinnaker_sdk"))]
    {
        let mut state = conn.mock_state();
        let slot = state
            .bools
            .get_mut(name)
            .ok_or_else(|| CamError::NodeNotFound(name.to_string()))?;
        *slot = value;
        Ok(())
    }
}

// =============================================================================
// String nodes
// =============================================================================

/// Read a string node's current value.
pub fn string_value(conn: &SpinConnection, name: &str) -> Result<String> {
    #[cfg(feature = "spinnaker_sdk")]
    {
        let node = node_handle(camera_of(conn)?, name)?;
        read_node_string(node, name)
    }
    #[cfg(not(feature = "spinnaker_sdk"))]
    {
        let state = conn.mock_state();
        state
            .strings
            .get(name)
            .cloned()
            .ok_or_else(|| CamError::NodeNotFound(name.to_string()).into())
    }
}

// =============================================================================
// Enumeration nodes
// =============================================================================

/// Read an enumeration node's current entry by symbolic name.
pub fn enum_value(conn: &SpinConnection, name: &str) -> Result<String> {
    #[cfg(feature = "spinnaker_sdk")]
    {
        let node = node_handle(camera_of(conn)?, name)?;
        let mut entry: spinnaker_sys::spinNodeHandle = std::ptr::null_mut();
        checked_call!(
            spinnaker_sys::spinEnumerationGetCurrentEntry(node, &mut entry),
            name
        );
        const MAX_BUF_LEN: usize = 256;
        let mut buf = [0i8; MAX_BUF_LEN];
        let mut len: spinnaker_sys::size_t = MAX_BUF_LEN as spinnaker_sys::size_t;
        // SAFETY: entry came from the node above; buf is writable for len bytes.
        let symbolic_result = unsafe {
            spinnaker_sys::spinEnumerationEntryGetSymbolic(entry, buf.as_mut_ptr(), &mut len)
        };
        // SAFETY: entry handles must be handed back to the SDK after use.
        unsafe {
            spinnaker_sys::spinEnumerationReleaseNode(node, entry);
        }
        if symbolic_result != spinnaker_sys::_spinError::SPINNAKER_ERR_SUCCESS {
            return Err(CamError::Camera(format!(
                "{} failed with Spinnaker error {:?}",
                name, symbolic_result
            ))
            .into());
        }
        // SAFETY: the SDK wrote a NUL-terminated string into buf.
        let value = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        Ok(value)
    }
    #[cfg(not(feature = "spinnaker_sdk"))]
    {
        let state = conn.mock_state();
        state
            .enums
            .get(name)
            .map(|n| n.current.clone())
            .ok_or_else(|| CamError::NodeNotFound(name.to_string()).into())
    }
}

/// Select an enumeration node's entry by symbolic name.
pub fn set_enum_entry(conn: &SpinConnection, name: &str, entry_name: &str) -> Result<()> {
    tracing::trace!(node = name, entry = entry_name, "node write");
    #[cfg(feature = "spinnaker_sdk")]
    {
        let node = node_handle(camera_of(conn)?, name)?;
        let entry_cstr = CString::new(entry_name)?;
        let mut entry: spinnaker_sys::spinNodeHandle = std::ptr::null_mut();
        // SAFETY: node is valid; entry_cstr outlives the call.
        let lookup = unsafe {
            spinnaker_sys::spinEnumerationGetEntryByName(node, entry_cstr.as_ptr(), &mut entry)
        };
        if lookup != spinnaker_sys::_spinError::SPINNAKER_ERR_SUCCESS || entry.is_null() {
            return Err(CamError::InvalidEnumEntry {
                node: name.to_string(),
                entry: entry_name.to_string(),
            }
            .into());
        }
        let mut int_value: i64 = 0;
        // SAFETY: entry is a valid entry handle from the lookup above.
        let got = unsafe { spinnaker_sys::spinEnumerationEntryGetIntValue(entry, &mut int_value) };
        // SAFETY: entry handles must be handed back to the SDK after use.
        unsafe {
            spinnaker_sys::spinEnumerationReleaseNode(node, entry);
        }
        if got != spinnaker_sys::_spinError::SPINNAKER_ERR_SUCCESS {
            return Err(CamError::Camera(format!(
                "{} entry '{}' failed with Spinnaker error {:?}",
                name, entry_name, got
            ))
            .into());
        }
        checked_call!(spinnaker_sys::spinEnumerationSetIntValue(node, int_value), name);
        Ok(())
    }
    #[cfg(not(feature = "spinnaker_sdk"))]
    {
        let mut state = conn.mock_state();
        let node = state
            .enums
            .get_mut(name)
            .ok_or_else(|| CamError::NodeNotFound(name.to_string()))?;
        if !node.entries.iter().any(|e| *e == entry_name) {
            return Err(CamError::InvalidEnumEntry {
                node: name.to_string(),
                entry: entry_name.to_string(),
            }
            .into());
        }
        node.current = entry_name.to_string();
        Ok(())
    }
}

// =============================================================================
// Command nodes
// =============================================================================

/// Execute a command node.
pub fn execute_command(conn: &SpinConnection, name: &str) -> Result<()> {
    tracing::trace!(node = name, "command execute");
    #[cfg(feature = "spinnaker_sdk")]
    {
        let node = node_handle(camera_of(conn)?, name)?;
        checked_call!(spinnaker_sys::spinCommandExecute(node), name);
        Ok(())
    }
    #[cfg(not(feature = "spinnaker_sdk"))]
    {
        let state = conn.mock_state();
        match name {
            genicam::TRIGGER_SOFTWARE => {
                state.software_trigger.notify_one();
                Ok(())
            }
            _ => Err(CamError::NodeNotFound(name.to_string()).into()),
        }
    }
}

#[cfg(all(test, not(feature = "spinnaker_sdk")))]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn float_node_roundtrip_and_bounds() {
        let conn = SpinConnection::new();
        let (min, max) = float_bounds(&conn, genicam::EXPOSURE_TIME).unwrap();
        assert_eq!(min, 12.0);
        assert_eq!(max, 30_000_000.0);

        set_float(&conn, genicam::EXPOSURE_TIME, 20_000.0).unwrap();
        assert_eq!(float_value(&conn, genicam::EXPOSURE_TIME).unwrap(), 20_000.0);
    }

    #[test]
    fn float_write_outside_bounds_rejected() {
        let conn = SpinConnection::new();
        let err = set_float(&conn, genicam::GAIN, 1000.0).unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn unknown_node_errors() {
        let conn = SpinConnection::new();
        assert!(float_value(&conn, "NoSuchNode").is_err());
        assert!(execute_command(&conn, "NoSuchCommand").is_err());
    }

    #[test]
    fn enum_entry_validation() {
        let conn = SpinConnection::new();
        set_enum_entry(&conn, genicam::TRIGGER_MODE, "On").unwrap();
        assert_eq!(enum_value(&conn, genicam::TRIGGER_MODE).unwrap(), "On");

        let err = set_enum_entry(&conn, genicam::TRIGGER_MODE, "Maybe").unwrap_err();
        assert!(err.to_string().contains("no entry named"));
    }

    #[test]
    fn int_and_string_nodes() {
        let conn = SpinConnection::new();
        assert_eq!(int_value(&conn, genicam::WIDTH).unwrap(), 1936);
        assert_eq!(
            string_value(&conn, genicam::DEVICE_VENDOR_NAME).unwrap(),
            "FLIR"
        );
    }
}
