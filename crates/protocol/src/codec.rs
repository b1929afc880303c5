//! Request and response layouts for the hub control requests
//!
//! Both requests use a single buffer for input and output: the caller writes a
//! fixed header, the hub writes its answer back into the same buffer.
//!
//! # Node connection information
//!
//! ```text
//! [ConnectionIndex: u32][DeviceDescriptor: 18][CurrentConfigurationValue: u8]
//! [Speed: u8][DeviceIsHub: u8][DeviceAddress: u16][NumberOfOpenPipes: u32]
//! [ConnectionStatus: u32][PipeList: 30 x 11 bytes]
//! ```
//!
//! # Descriptor from node connection
//!
//! ```text
//! [ConnectionIndex: u32][bmRequest: u8][bRequest: u8][wValue: u16][wIndex: u16]
//! [wLength: u16][Data: wLength bytes]
//! ```
//!
//! All integers are little-endian and the layouts are packed.

use crate::error::{ProtocolError, Result};
use crate::ioctl::{MAXIMUM_USB_STRING_LENGTH, STRING_DESCRIPTOR_TYPE};
use crate::types::{ConnectionDetails, ConnectionStatus, DeviceDescriptor, DeviceSpeed};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Maximum number of endpoints per configuration
pub const MAX_PIPES: usize = 30;

/// Size of one pipe-info slot (endpoint descriptor + schedule offset)
pub const PIPE_INFO_SIZE: usize = 7 + 4;

/// Answer to a node-connection-information request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeConnectionInfo {
    pub connection_index: u32,
    pub device_descriptor: DeviceDescriptor,
    pub current_configuration: u8,
    pub speed: u8,
    pub device_is_hub: bool,
    pub device_address: u16,
    pub open_pipes: u32,
    pub connection_status: u32,
}

impl NodeConnectionInfo {
    /// Size of the fixed part, without the pipe list
    pub const HEADER_SIZE: usize = 4 + DeviceDescriptor::SIZE + 1 + 1 + 1 + 2 + 4 + 4;

    /// Size of the request buffer, including room for every pipe slot
    pub const BUFFER_SIZE: usize = Self::HEADER_SIZE + MAX_PIPES * PIPE_INFO_SIZE;

    /// Build a zeroed request buffer addressed at `port`
    pub fn request_buffer(port: u32) -> Vec<u8> {
        let mut buffer = vec![0u8; Self::BUFFER_SIZE];
        buffer[..4].copy_from_slice(&port.to_le_bytes());
        buffer
    }

    /// Connection index (port) a request buffer is addressed at
    pub fn requested_port(input: &[u8]) -> Result<u32> {
        let mut cursor = Cursor::new(input);
        cursor.read_u32::<LittleEndian>().map_err(|_| ProtocolError::ShortResponse {
            expected: 4,
            actual: input.len(),
        })
    }

    /// Decode the bytes the hub returned
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(ProtocolError::ShortResponse {
                expected: Self::HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        Self::read_from(&mut Cursor::new(bytes))
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let connection_index = reader.read_u32::<LittleEndian>()?;
        let device_descriptor = DeviceDescriptor::read_from(reader)?;
        let current_configuration = reader.read_u8()?;
        let speed = reader.read_u8()?;
        let device_is_hub = reader.read_u8()? != 0;
        let device_address = reader.read_u16::<LittleEndian>()?;
        let open_pipes = reader.read_u32::<LittleEndian>()?;
        let connection_status = reader.read_u32::<LittleEndian>()?;

        Ok(Self {
            connection_index,
            device_descriptor,
            current_configuration,
            speed,
            device_is_hub,
            device_address,
            open_pipes,
            connection_status,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.connection_index)?;
        self.device_descriptor.write_to(writer)?;
        writer.write_u8(self.current_configuration)?;
        writer.write_u8(self.speed)?;
        writer.write_u8(u8::from(self.device_is_hub))?;
        writer.write_u16::<LittleEndian>(self.device_address)?;
        writer.write_u32::<LittleEndian>(self.open_pipes)?;
        writer.write_u32::<LittleEndian>(self.connection_status)?;
        Ok(())
    }

    /// Write the fixed header into a response buffer, returning the byte count
    pub fn encode_into(&self, output: &mut [u8]) -> Result<usize> {
        if output.len() < Self::HEADER_SIZE {
            return Err(ProtocolError::BufferTooSmall {
                needed: Self::HEADER_SIZE,
                available: output.len(),
            });
        }
        self.write_to(&mut Cursor::new(&mut output[..Self::HEADER_SIZE]))?;
        Ok(Self::HEADER_SIZE)
    }

    /// Port details for the device record
    pub fn details(&self) -> ConnectionDetails {
        ConnectionDetails {
            speed: DeviceSpeed::from_raw(self.speed),
            device_address: self.device_address,
            device_is_hub: self.device_is_hub,
            status: ConnectionStatus::from_raw(self.connection_status),
            open_pipes: self.open_pipes,
            current_configuration: self.current_configuration,
        }
    }
}

/// USB setup packet as embedded in a descriptor request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

/// Header of a get-descriptor-from-node-connection request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorRequest {
    pub connection_index: u32,
    pub setup: SetupPacket,
}

impl DescriptorRequest {
    pub const HEADER_SIZE: usize = 4 + 8;

    /// Buffer size of a string request: header plus the longest string
    pub const STRING_BUFFER_SIZE: usize = Self::HEADER_SIZE + MAXIMUM_USB_STRING_LENGTH;

    /// String descriptor request for `index` in `language`
    ///
    /// bmRequest and bRequest stay zero; the hub driver fills them in.
    pub fn string(port: u32, index: u8, language: u16) -> Self {
        Self {
            connection_index: port,
            setup: SetupPacket {
                request_type: 0,
                request: 0,
                value: (u16::from(STRING_DESCRIPTOR_TYPE) << 8) | u16::from(index),
                index: language,
                length: MAXIMUM_USB_STRING_LENGTH as u16,
            },
        }
    }

    /// Descriptor type requested (high byte of wValue)
    pub fn descriptor_type(&self) -> u8 {
        (self.setup.value >> 8) as u8
    }

    /// Descriptor index requested (low byte of wValue)
    pub fn descriptor_index(&self) -> u8 {
        (self.setup.value & 0xff) as u8
    }

    /// Header followed by a zeroed data area of `wLength` bytes
    pub fn to_buffer(&self) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; Self::HEADER_SIZE + usize::from(self.setup.length)];
        self.write_to(&mut Cursor::new(&mut buffer[..]))?;
        Ok(buffer)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(ProtocolError::ShortResponse {
                expected: Self::HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        Self::read_from(&mut Cursor::new(bytes))
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let connection_index = reader.read_u32::<LittleEndian>()?;
        let setup = SetupPacket {
            request_type: reader.read_u8()?,
            request: reader.read_u8()?,
            value: reader.read_u16::<LittleEndian>()?,
            index: reader.read_u16::<LittleEndian>()?,
            length: reader.read_u16::<LittleEndian>()?,
        };
        Ok(Self {
            connection_index,
            setup,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.connection_index)?;
        writer.write_u8(self.setup.request_type)?;
        writer.write_u8(self.setup.request)?;
        writer.write_u16::<LittleEndian>(self.setup.value)?;
        writer.write_u16::<LittleEndian>(self.setup.index)?;
        writer.write_u16::<LittleEndian>(self.setup.length)?;
        Ok(())
    }
}

/// Decode a string descriptor (`bLength`, `bDescriptorType`, `bString`)
///
/// The text is bounded by `bLength` and by the bytes available, and ends at
/// the first NUL code unit. Unpaired surrogates become U+FFFD.
pub fn decode_string_descriptor(data: &[u8]) -> Result<String> {
    if data.len() < 2 {
        return Err(ProtocolError::ShortResponse {
            expected: 2,
            actual: data.len(),
        });
    }
    let end = usize::from(data[0]).clamp(2, data.len());
    Ok(decode_utf16_le(&data[2..end]))
}

/// Encode `text` as a string descriptor, truncated to the USB maximum
pub fn encode_string_descriptor(text: &str) -> Vec<u8> {
    let max_units = (MAXIMUM_USB_STRING_LENGTH - 2) / 2;
    let units: Vec<u16> = text.encode_utf16().take(max_units).collect();

    let mut out = Vec::with_capacity(2 + units.len() * 2);
    out.push((2 + units.len() * 2) as u8);
    out.push(STRING_DESCRIPTOR_TYPE);
    for unit in units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Decode UTF-16LE bytes up to the first NUL code unit
///
/// A trailing odd byte is ignored.
pub fn decode_utf16_le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Encode `text` as NUL-terminated UTF-16LE, the form of a REG_SZ property
pub fn encode_utf16_le_z(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}
