//! Common utilities for the USB descriptor reader
//!
//! This crate provides what the reader's components share: the error type,
//! logging setup, the platform service traits the descriptor pipeline is
//! written against, and an in-memory fake platform for tests.

pub mod error;
pub mod logging;
pub mod platform;
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::setup_logging;
pub use platform::{
    ControlChannel, DevicePlatform, DeviceSnapshot, InterfaceClass, NodeId, RegistryProperty,
};
