//! Hub request codes and USB constants
//!
//! The two hub requests are addressed by their Windows IOCTL codes so the
//! native backend can hand them straight to `DeviceIoControl`. Other backends
//! match on [`HubIoctl`] and emulate the same request/response layouts.

use crate::error::{ProtocolError, Result};

/// Device type used by the USB hub driver
const FILE_DEVICE_USB: u32 = 0x22;
const METHOD_BUFFERED: u32 = 0;
const FILE_ANY_ACCESS: u32 = 0;

const USB_GET_DESCRIPTOR_FROM_NODE_CONNECTION: u32 = 260;
const USB_GET_NODE_CONNECTION_INFORMATION_EX: u32 = 274;

/// `bDescriptorType` of a device descriptor
pub const DEVICE_DESCRIPTOR_TYPE: u8 = 0x01;
/// `bDescriptorType` of a string descriptor
pub const STRING_DESCRIPTOR_TYPE: u8 = 0x03;
/// Standard GET_DESCRIPTOR request
pub const GET_DESCRIPTOR: u8 = 0x06;
/// Device-to-host, standard, device recipient
pub const REQUEST_TYPE_IN_STANDARD_DEVICE: u8 = 0x80;
/// US English (0x0409)
pub const LANGUAGE_US_ENGLISH: u16 = 1033;
/// Largest string descriptor a device can return
pub const MAXIMUM_USB_STRING_LENGTH: usize = 255;
/// USB device class code of a hub
pub const HUB_CLASS_CODE: u8 = 0x09;

const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

/// Control requests issued against a hub's control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubIoctl {
    /// Connection information for one port, including the device descriptor
    GetNodeConnectionInformationEx,
    /// Any descriptor of the device on one port, fetched through the hub
    GetDescriptorFromNodeConnection,
}

impl HubIoctl {
    /// Numeric request code
    pub const fn code(self) -> u32 {
        match self {
            Self::GetNodeConnectionInformationEx => ctl_code(
                FILE_DEVICE_USB,
                USB_GET_NODE_CONNECTION_INFORMATION_EX,
                METHOD_BUFFERED,
                FILE_ANY_ACCESS,
            ),
            Self::GetDescriptorFromNodeConnection => ctl_code(
                FILE_DEVICE_USB,
                USB_GET_DESCRIPTOR_FROM_NODE_CONNECTION,
                METHOD_BUFFERED,
                FILE_ANY_ACCESS,
            ),
        }
    }

    pub fn from_code(code: u32) -> Result<Self> {
        [
            Self::GetNodeConnectionInformationEx,
            Self::GetDescriptorFromNodeConnection,
        ]
        .into_iter()
        .find(|ioctl| ioctl.code() == code)
        .ok_or(ProtocolError::UnknownIoctl(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ioctl_codes_match_usbioctl_h() {
        assert_eq!(HubIoctl::GetNodeConnectionInformationEx.code(), 0x0022_0448);
        assert_eq!(HubIoctl::GetDescriptorFromNodeConnection.code(), 0x0022_0410);
    }

    #[test]
    fn test_from_code() {
        assert_eq!(
            HubIoctl::from_code(0x0022_0410).unwrap(),
            HubIoctl::GetDescriptorFromNodeConnection
        );
        assert!(HubIoctl::from_code(0x0022_0000).is_err());
    }
}
