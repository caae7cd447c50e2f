//! Open/configure/capture round trips against the mock device.

#![cfg(not(feature = "spinnaker_sdk"))]
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use gencam_core::capabilities::{FrameProducer, Parameterized};
use gencam_core::PixelFormat;
use gencam_driver_spinnaker::SpinnakerDriver;

async fn open_driver() -> SpinnakerDriver {
    SpinnakerDriver::new_async("22421982".to_string())
        .await
        .unwrap()
}

#[tokio::test]
async fn single_frame_is_tightly_packed() {
    let driver = open_driver().await;

    let (width, height) = driver.resolution();
    assert_eq!((width, height), (1936, 1464));

    let frame = driver.acquire_frame().await.unwrap();
    assert_eq!(frame.width, width);
    assert_eq!(frame.height, height);
    assert_eq!(frame.format, PixelFormat::Mono8);
    // Padding stripped: exactly width * height bytes survive conversion.
    assert_eq!(frame.data.len(), frame.expected_len());
    assert!(frame.mean() > 0.0);

    // One-shot capture stops the stream again.
    assert!(!driver.is_streaming().await.unwrap());

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn streaming_delivers_sequenced_frames() {
    let driver = open_driver().await;

    let mut rx = driver.subscribe_frames().await.unwrap();
    driver.start_stream().await.unwrap();
    assert!(driver.is_streaming().await.unwrap());

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.sequence, first.sequence + 1);
    assert!(driver.frame_count() >= 2);

    driver.stop_stream().await.unwrap();
    assert!(!driver.is_streaming().await.unwrap());

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn double_start_errors_and_stop_is_idempotent() {
    let driver = open_driver().await;

    driver.start_stream().await.unwrap();
    let err = driver.start_stream().await.unwrap_err();
    assert!(err.to_string().contains("already streaming"));

    driver.stop_stream().await.unwrap();
    driver.stop_stream().await.unwrap();

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn info_parameters_reflect_the_device() {
    let driver = open_driver().await;
    let params = driver.parameters();

    let serial = params.get("info.serial_number").unwrap();
    assert_eq!(serial.get_json().unwrap(), serde_json::json!("22421982"));
    assert!(serial.metadata().read_only);
    assert!(serial.set_json(serde_json::json!("other")).is_err());

    let model = params.get("info.model_name").unwrap();
    assert_eq!(
        model.get_json().unwrap(),
        serde_json::json!("Blackfly S BFS-U3-28S5M")
    );

    let width = params.get("sensor.width").unwrap();
    assert_eq!(width.get_json().unwrap(), serde_json::json!(1936));

    driver.shutdown().await.unwrap();
}
