//! Hub control protocol for the USB descriptor reader
//!
//! This crate defines the binary layouts exchanged with a USB hub's control
//! channel: the node-connection-information request that carries a device
//! descriptor, and the get-descriptor-from-node-connection request used for
//! string descriptors. It also defines the device record produced by a pass.
//!
//! # Example
//!
//! ```
//! use protocol::{DescriptorRequest, LANGUAGE_US_ENGLISH, decode_string_descriptor,
//!     encode_string_descriptor};
//!
//! let request = DescriptorRequest::string(4, 2, LANGUAGE_US_ENGLISH);
//! let buffer = request.to_buffer().unwrap();
//! assert_eq!(buffer.len(), DescriptorRequest::STRING_BUFFER_SIZE);
//!
//! let descriptor = encode_string_descriptor("Keyboard");
//! assert_eq!(decode_string_descriptor(&descriptor).unwrap(), "Keyboard");
//! ```

pub mod codec;
pub mod error;
pub mod ioctl;
pub mod types;

pub use codec::{
    DescriptorRequest, MAX_PIPES, NodeConnectionInfo, PIPE_INFO_SIZE, SetupPacket,
    decode_string_descriptor, decode_utf16_le, encode_string_descriptor, encode_utf16_le_z,
};
pub use error::{ProtocolError, Result};
pub use ioctl::{
    DEVICE_DESCRIPTOR_TYPE, GET_DESCRIPTOR, HUB_CLASS_CODE, HubIoctl, LANGUAGE_US_ENGLISH,
    MAXIMUM_USB_STRING_LENGTH, REQUEST_TYPE_IN_STANDARD_DEVICE, STRING_DESCRIPTOR_TYPE,
};
pub use types::{ConnectionDetails, ConnectionStatus, DeviceDescriptor, DeviceRecord, DeviceSpeed};
