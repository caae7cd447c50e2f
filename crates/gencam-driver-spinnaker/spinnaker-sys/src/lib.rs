//! Raw FFI bindings for the FLIR Spinnaker C SDK (`SpinnakerC.h`).
//!
//! Bindings are generated at build time with bindgen when the
//! `spinnaker-sdk` feature is enabled; otherwise this crate is empty and
//! exists only so dependents link cleanly in mock mode.

#![allow(
    non_camel_case_types,
    non_upper_case_globals,
    non_snake_case,
    unsafe_code,
    clippy::all
)]

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
