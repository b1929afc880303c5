//! Host platform backends
//!
//! # Platform Support
//!
//! - **Windows**: SetupAPI enumeration and hub driver IOCTLs
//! - **Linux / macOS**: libusb, emulating the hub requests in user space
//!
//! Both speak the same request and response layouts, so the descriptor
//! pipeline is identical on every host.

#[cfg(not(windows))]
mod libusb;
#[cfg(windows)]
mod win32;

#[cfg(not(windows))]
pub use libusb::{LibusbChannel, LibusbEntry, LibusbPlatform, LibusbSnapshot};
#[cfg(windows)]
pub use win32::{WindowsChannel, WindowsEntry, WindowsPlatform, WindowsSnapshot};

/// Backend for the current host
#[cfg(not(windows))]
pub type NativePlatform = LibusbPlatform;

/// Backend for the current host
#[cfg(windows)]
pub type NativePlatform = WindowsPlatform;

/// Open the backend for the current host
pub fn open_platform() -> common::Result<NativePlatform> {
    NativePlatform::new()
}
