//! Core types and traits for gencam.
//!
//! This crate is hardware-agnostic: it defines the parameter abstraction,
//! the capability traits drivers implement, the frame container and the
//! application error type. Driver crates (e.g. `gencam-driver-spinnaker`)
//! depend on this crate, never the other way around.

pub mod capabilities;
pub mod data;
pub mod error;
pub mod parameter;

pub use data::{Frame, PixelFormat};
pub use error::{CamError, CamResult, DriverError, DriverErrorKind};
pub use parameter::{Parameter, ParameterBase, ParameterMetadata, ParameterSet};
