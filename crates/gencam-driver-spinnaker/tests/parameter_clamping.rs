//! Numeric requests clamp to the bounds the device reports, and the
//! parameter reflects the applied value after read-back.

#![cfg(not(feature = "spinnaker_sdk"))]
#![allow(clippy::unwrap_used, clippy::float_cmp)]

use gencam_core::capabilities::{ExposureControl, GainControl, Parameterized};
use gencam_driver_spinnaker::SpinnakerDriver;

async fn open_driver() -> SpinnakerDriver {
    SpinnakerDriver::new_async("22421982".to_string())
        .await
        .unwrap()
}

#[tokio::test]
async fn exposure_clamps_high_and_low() {
    let driver = open_driver().await;

    assert_eq!(driver.set_exposure_us(1e12).await.unwrap(), 30_000_000.0);
    assert_eq!(driver.set_exposure_us(0.001).await.unwrap(), 12.0);
    assert_eq!(driver.set_exposure_us(20_000.0).await.unwrap(), 20_000.0);

    // Parameter carries the applied value, not the request.
    let params = driver.parameters();
    let exposure = params.get("acquisition.exposure_us").unwrap();
    assert_eq!(exposure.get_json().unwrap(), serde_json::json!(20_000.0));

    assert!(driver.set_exposure_us(f64::NAN).await.is_err());

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn exposure_trait_converts_seconds() {
    let driver = open_driver().await;

    driver.set_exposure(0.5).await.unwrap();
    assert_eq!(driver.get_exposure().await.unwrap(), 0.5);

    // A full minute is beyond the 30 s limit; the trait reports the clamp.
    driver.set_exposure(60.0).await.unwrap();
    assert_eq!(driver.get_exposure().await.unwrap(), 30.0);

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn gain_clamps_to_device_bounds() {
    let driver = open_driver().await;

    assert_eq!(driver.set_gain_db(100.0).await.unwrap(), 47.99);
    assert_eq!(driver.set_gain_db(-3.0).await.unwrap(), 0.0);
    assert_eq!(GainControl::get_gain_db(&driver).await.unwrap(), 0.0);

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn frame_rate_clamps_to_device_bounds() {
    let driver = open_driver().await;

    assert_eq!(driver.set_frame_rate_hz(1000.0).await.unwrap(), 170.0);
    assert_eq!(driver.set_frame_rate_hz(0.1).await.unwrap(), 1.0);
    assert_eq!(driver.set_frame_rate_hz(30.0).await.unwrap(), 30.0);

    driver.shutdown().await.unwrap();
}
