//! Named-property operations on the camera.
//!
//! This is the policy layer above the raw node map: the fixed set of
//! properties the driver manages, the clamp-to-device-bounds behavior for
//! numeric settings, and the three-way trigger configuration. Every
//! operation is a short sequence of node-map calls.

use anyhow::Result;

use gencam_core::PixelFormat;

use crate::components::connection::SpinConnection;
use crate::components::nodemap::{self, flir, genicam};

/// Camera identity block read once at open.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub model_name: String,
    pub vendor_name: String,
    pub serial_number: String,
}

/// Trigger policy for frame capture: free-running, software-initiated or
/// hardware-line-initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    /// Free-running continuous acquisition, triggering off.
    #[default]
    None,
    /// Frames start on the `TriggerSoftware` command.
    Software,
    /// Frames start on the opto-isolated input Line0.
    Hardware,
}

impl TriggerMode {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s {
            "Software" => TriggerMode::Software,
            "Hardware" => TriggerMode::Hardware,
            _ => TriggerMode::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::None => "None",
            TriggerMode::Software => "Software",
            TriggerMode::Hardware => "Hardware",
        }
    }

    pub fn all_choices() -> Vec<String> {
        vec!["None".into(), "Software".into(), "Hardware".into()]
    }
}

/// Apply the device defaults expected by the rest of the driver: manual
/// exposure and gain, unity gamma, continuous acquisition, triggering off.
pub fn configure_defaults(conn: &SpinConnection) -> Result<()> {
    nodemap::set_enum_entry(conn, genicam::EXPOSURE_AUTO, "Off")?;
    nodemap::set_enum_entry(conn, genicam::GAIN_AUTO, "Off")?;
    nodemap::set_float(conn, genicam::GAMMA, 1.0)?;
    nodemap::set_enum_entry(conn, genicam::ACQUISITION_MODE, "Continuous")?;
    setup_trigger(conn, TriggerMode::None)?;
    tracing::debug!("device defaults applied");
    Ok(())
}

/// Read the camera identity block.
pub fn camera_info(conn: &SpinConnection) -> Result<CameraInfo> {
    Ok(CameraInfo {
        model_name: nodemap::string_value(conn, genicam::DEVICE_MODEL_NAME)?,
        vendor_name: nodemap::string_value(conn, genicam::DEVICE_VENDOR_NAME)?,
        serial_number: nodemap::string_value(conn, genicam::DEVICE_SERIAL_NUMBER)?,
    })
}

/// Current sensor dimensions in pixels.
pub fn sensor_size(conn: &SpinConnection) -> Result<(u32, u32)> {
    let width = nodemap::int_value(conn, genicam::WIDTH)?;
    let height = nodemap::int_value(conn, genicam::HEIGHT)?;
    Ok((width as u32, height as u32))
}

/// Current pixel format.
pub fn pixel_format(conn: &SpinConnection) -> Result<PixelFormat> {
    let symbolic = nodemap::enum_value(conn, genicam::PIXEL_FORMAT)?;
    PixelFormat::from_symbolic(&symbolic).ok_or_else(|| {
        anyhow::anyhow!("unsupported pixel format '{}' (mono formats only)", symbolic)
    })
}

/// Current sensor temperature in Celsius.
pub fn device_temperature(conn: &SpinConnection) -> Result<f64> {
    nodemap::float_value(conn, genicam::DEVICE_TEMPERATURE)
}

// =============================================================================
// Clamped numeric setters
// =============================================================================

/// Clamp `requested` into a float node's device-reported bounds, write the
/// clamped value and return it.
fn set_float_clamped(conn: &SpinConnection, node: &str, requested: f64) -> Result<f64> {
    if requested.is_nan() {
        anyhow::bail!("refusing to write NaN to node '{}'", node);
    }
    let (min, max) = nodemap::float_bounds(conn, node)?;
    let applied = requested.clamp(min, max);
    if applied != requested {
        tracing::debug!(
            node,
            requested,
            applied,
            min,
            max,
            "request clamped to device bounds"
        );
    }
    nodemap::set_float(conn, node, applied)?;
    Ok(applied)
}

/// Exposure time in microseconds.
pub fn get_exposure_us(conn: &SpinConnection) -> Result<f64> {
    nodemap::float_value(conn, genicam::EXPOSURE_TIME)
}

/// Set exposure time in microseconds, clamped to the device range.
/// Returns the applied value.
pub fn set_exposure_us(conn: &SpinConnection, requested: f64) -> Result<f64> {
    set_float_clamped(conn, genicam::EXPOSURE_TIME, requested)
}

/// Sensor gain in dB.
pub fn get_gain_db(conn: &SpinConnection) -> Result<f64> {
    nodemap::float_value(conn, genicam::GAIN)
}

/// Set sensor gain in dB, clamped to the device range. Returns the applied
/// value.
pub fn set_gain_db(conn: &SpinConnection, requested: f64) -> Result<f64> {
    set_float_clamped(conn, genicam::GAIN, requested)
}

/// Acquisition frame rate in Hz.
pub fn get_frame_rate_hz(conn: &SpinConnection) -> Result<f64> {
    nodemap::float_value(conn, genicam::ACQUISITION_FRAME_RATE)
}

/// Set the free-run frame rate in Hz, clamped to the device range.
///
/// Enables manual frame-rate control first; Blackfly cameras ignore the
/// rate node while `AcquisitionFrameRateEnable` is false.
pub fn set_frame_rate_hz(conn: &SpinConnection, requested: f64) -> Result<f64> {
    nodemap::set_bool(conn, flir::ACQUISITION_FRAME_RATE_ENABLE, true)?;
    set_float_clamped(conn, genicam::ACQUISITION_FRAME_RATE, requested)
}

/// Gamma correction factor (written as-is; the device rejects values
/// outside its range).
pub fn set_gamma(conn: &SpinConnection, gamma: f64) -> Result<()> {
    nodemap::set_float(conn, genicam::GAMMA, gamma)
}

// =============================================================================
// Trigger configuration
// =============================================================================

/// Apply one of the three trigger configurations.
///
/// `TriggerMode` is always switched off first: GenICam devices reject
/// selector/source changes while triggering is active.
pub fn setup_trigger(conn: &SpinConnection, mode: TriggerMode) -> Result<()> {
    nodemap::set_enum_entry(conn, genicam::TRIGGER_MODE, "Off")?;

    match mode {
        TriggerMode::None => {}
        TriggerMode::Software => {
            nodemap::set_enum_entry(conn, genicam::TRIGGER_SELECTOR, "FrameStart")?;
            nodemap::set_enum_entry(conn, genicam::TRIGGER_SOURCE, "Software")?;
            nodemap::set_enum_entry(conn, genicam::TRIGGER_MODE, "On")?;
        }
        TriggerMode::Hardware => {
            nodemap::set_enum_entry(conn, genicam::TRIGGER_SELECTOR, "FrameStart")?;
            nodemap::set_enum_entry(conn, genicam::TRIGGER_SOURCE, "Line0")?;
            nodemap::set_enum_entry(conn, genicam::TRIGGER_MODE, "On")?;
        }
    }
    tracing::debug!(mode = mode.as_str(), "trigger configured");
    Ok(())
}

/// Derive the effective trigger policy from the device nodes.
pub fn current_trigger(conn: &SpinConnection) -> Result<TriggerMode> {
    if nodemap::enum_value(conn, genicam::TRIGGER_MODE)? == "Off" {
        return Ok(TriggerMode::None);
    }
    match nodemap::enum_value(conn, genicam::TRIGGER_SOURCE)?.as_str() {
        "Software" => Ok(TriggerMode::Software),
        _ => Ok(TriggerMode::Hardware),
    }
}

/// Execute a software trigger.
///
/// The command always executes; it only results in a frame while the
/// device is configured for software triggering.
pub fn execute_software_trigger(conn: &SpinConnection) -> Result<()> {
    nodemap::execute_command(conn, genicam::TRIGGER_SOFTWARE)
}

#[cfg(all(test, not(feature = "spinnaker_sdk")))]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_auto_modes() {
        let conn = SpinConnection::new();
        configure_defaults(&conn).unwrap();

        assert_eq!(
            nodemap::enum_value(&conn, genicam::EXPOSURE_AUTO).unwrap(),
            "Off"
        );
        assert_eq!(nodemap::enum_value(&conn, genicam::GAIN_AUTO).unwrap(), "Off");
        assert_eq!(nodemap::float_value(&conn, genicam::GAMMA).unwrap(), 1.0);
        assert_eq!(
            nodemap::enum_value(&conn, genicam::ACQUISITION_MODE).unwrap(),
            "Continuous"
        );
        assert_eq!(current_trigger(&conn).unwrap(), TriggerMode::None);
    }

    #[test]
    fn exposure_clamps_to_device_bounds() {
        let conn = SpinConnection::new();
        assert_eq!(set_exposure_us(&conn, 1e12).unwrap(), 30_000_000.0);
        assert_eq!(set_exposure_us(&conn, 0.001).unwrap(), 12.0);
        assert_eq!(set_exposure_us(&conn, 5000.0).unwrap(), 5000.0);
        assert_eq!(get_exposure_us(&conn).unwrap(), 5000.0);
        assert!(set_exposure_us(&conn, f64::NAN).is_err());
    }

    #[test]
    fn gain_clamps_to_device_bounds() {
        let conn = SpinConnection::new();
        assert_eq!(set_gain_db(&conn, 100.0).unwrap(), 47.99);
        assert_eq!(set_gain_db(&conn, -5.0).unwrap(), 0.0);
    }

    #[test]
    fn frame_rate_set_enables_manual_control() {
        let conn = SpinConnection::new();
        assert_eq!(set_frame_rate_hz(&conn, 500.0).unwrap(), 170.0);
        assert!(nodemap::bool_value(&conn, flir::ACQUISITION_FRAME_RATE_ENABLE).unwrap());
    }

    #[test]
    fn trigger_switch_sequences_nodes() {
        let conn = SpinConnection::new();

        setup_trigger(&conn, TriggerMode::Software).unwrap();
        assert_eq!(nodemap::enum_value(&conn, genicam::TRIGGER_MODE).unwrap(), "On");
        assert_eq!(
            nodemap::enum_value(&conn, genicam::TRIGGER_SOURCE).unwrap(),
            "Software"
        );
        assert_eq!(
            nodemap::enum_value(&conn, genicam::TRIGGER_SELECTOR).unwrap(),
            "FrameStart"
        );
        assert_eq!(current_trigger(&conn).unwrap(), TriggerMode::Software);

        setup_trigger(&conn, TriggerMode::Hardware).unwrap();
        assert_eq!(
            nodemap::enum_value(&conn, genicam::TRIGGER_SOURCE).unwrap(),
            "Line0"
        );
        assert_eq!(current_trigger(&conn).unwrap(), TriggerMode::Hardware);

        setup_trigger(&conn, TriggerMode::None).unwrap();
        assert_eq!(nodemap::enum_value(&conn, genicam::TRIGGER_MODE).unwrap(), "Off");
        assert_eq!(current_trigger(&conn).unwrap(), TriggerMode::None);
    }

    #[test]
    fn trigger_mode_string_round_trip() {
        for mode in [TriggerMode::None, TriggerMode::Software, TriggerMode::Hardware] {
            assert_eq!(TriggerMode::from_str(mode.as_str()), mode);
        }
        // Unknown strings fall back to free-run, like the device default.
        assert_eq!(TriggerMode::from_str("Bogus"), TriggerMode::None);
        assert_eq!(TriggerMode::all_choices().len(), 3);
    }
}
