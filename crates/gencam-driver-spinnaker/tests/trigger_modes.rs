//! Three-way trigger switching and software-trigger frame gating.

#![cfg(not(feature = "spinnaker_sdk"))]
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use gencam_core::capabilities::{FrameProducer, Parameterized, Triggerable};
use gencam_driver_spinnaker::{SpinnakerDriver, TriggerMode};

async fn open_driver() -> SpinnakerDriver {
    SpinnakerDriver::new_async("22421982".to_string())
        .await
        .unwrap()
}

#[tokio::test]
async fn trigger_mode_switches_and_reads_back() {
    let driver = open_driver().await;
    assert_eq!(driver.trigger_mode(), TriggerMode::None);

    driver.set_trigger_mode(TriggerMode::Software).await.unwrap();
    assert_eq!(driver.trigger_mode(), TriggerMode::Software);

    driver.set_trigger_mode(TriggerMode::Hardware).await.unwrap();
    assert_eq!(driver.trigger_mode(), TriggerMode::Hardware);

    driver.set_trigger_mode(TriggerMode::None).await.unwrap();
    assert_eq!(driver.trigger_mode(), TriggerMode::None);

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn software_trigger_gates_frames() {
    let driver = open_driver().await;
    driver.set_trigger_mode(TriggerMode::Software).await.unwrap();

    let mut rx = driver.subscribe_frames().await.unwrap();
    driver.start_stream().await.unwrap();

    // No trigger issued: no frame may arrive.
    let idle = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(idle.is_err(), "frame arrived without a software trigger");

    driver.arm().await.unwrap();
    assert!(driver.is_armed().await.unwrap());
    driver.trigger().await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no frame after software trigger")
        .unwrap();
    assert_eq!(frame.sequence, 0);

    driver.stop_stream().await.unwrap();
    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn hardware_trigger_produces_no_frames_without_line_signal() {
    let driver = open_driver().await;
    driver.set_trigger_mode(TriggerMode::Hardware).await.unwrap();

    let mut rx = driver.subscribe_frames().await.unwrap();
    driver.start_stream().await.unwrap();

    let idle = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(idle.is_err(), "frame arrived without a hardware line signal");

    // A software trigger is accepted but has no effect on Line0 triggering.
    driver.trigger().await.unwrap();
    let still_idle = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(still_idle.is_err());

    driver.stop_stream().await.unwrap();
    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_trigger_choice_is_rejected() {
    let driver = open_driver().await;
    let params = driver.parameters();

    let trigger = params.get("acquisition.trigger_mode").unwrap();
    let err = trigger.set_json(serde_json::json!("Bogus")).unwrap_err();
    assert!(err.to_string().contains("not a valid choice"));

    // The device configuration is untouched.
    assert_eq!(driver.trigger_mode(), TriggerMode::None);

    driver.shutdown().await.unwrap();
}
