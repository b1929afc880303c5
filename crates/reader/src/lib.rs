//! USB descriptor reader
//!
//! Enumerates the USB devices present on the host and reads each one's device
//! descriptor and manufacturer, serial and product strings through the hub it
//! is attached to.
//!
//! The pipeline in [`usb`] is written against [`common::DevicePlatform`];
//! [`platform::open_platform`] returns the backend for the current host.

pub mod config;
pub mod location;
pub mod platform;
pub mod report;
pub mod usb;

pub use config::{ReaderConfig, load_config};
pub use location::{LocationError, parse_port};
pub use report::{OutputFormat, ReportOptions, render};
pub use usb::{DeviceEnumerator, EnumerationOptions, enumerate_devices};
