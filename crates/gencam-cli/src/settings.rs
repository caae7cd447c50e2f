//! Capture settings, layered from an optional TOML file and `GENCAM_*`
//! environment variables. Command-line flags override both.

use std::path::Path;

use gencam_core::CamResult;
use serde::Deserialize;

fn default_serial() -> String {
    // Serial of the bench camera; override via file, env or --serial.
    "22421982".to_string()
}

fn default_trigger() -> String {
    "None".to_string()
}

fn default_frames() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureSettings {
    /// Camera serial number to open.
    #[serde(default = "default_serial")]
    pub serial: String,

    /// Exposure time in microseconds; leave unset to keep the device value.
    #[serde(default)]
    pub exposure_us: Option<f64>,

    /// Sensor gain in dB; leave unset to keep the device value.
    #[serde(default)]
    pub gain_db: Option<f64>,

    /// Free-run frame rate in Hz; leave unset to keep the device value.
    #[serde(default)]
    pub frame_rate_hz: Option<f64>,

    /// Trigger mode: "None", "Software" or "Hardware".
    #[serde(default = "default_trigger")]
    pub trigger: String,

    /// Number of frames to capture.
    #[serde(default = "default_frames")]
    pub frames: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            serial: default_serial(),
            exposure_us: None,
            gain_db: None,
            frame_rate_hz: None,
            trigger: default_trigger(),
            frames: default_frames(),
        }
    }
}

impl CaptureSettings {
    /// Load settings: optional TOML file, then `GENCAM_*` environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> CamResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }
        let cfg = builder
            .add_source(config::Environment::with_prefix("GENCAM"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let settings = CaptureSettings::load(None).unwrap();
        assert_eq!(settings.serial, "22421982");
        assert_eq!(settings.trigger, "None");
        assert_eq!(settings.frames, 1);
        assert!(settings.exposure_us.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "serial = \"12345678\"\nexposure_us = 5000.0\ntrigger = \"Software\"\nframes = 4"
        )
        .unwrap();

        let settings = CaptureSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.serial, "12345678");
        assert_eq!(settings.exposure_us, Some(5000.0));
        assert_eq!(settings.trigger, "Software");
        assert_eq!(settings.frames, 4);
    }

    #[test]
    fn missing_file_errors() {
        let result = CaptureSettings::load(Some(Path::new("/nonexistent/gencam.toml")));
        assert!(result.is_err());
    }
}
