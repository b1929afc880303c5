//! USB descriptor and device record types
//!
//! All integer fields are raw little-endian wire values. Nothing here checks
//! them against the USB class tables; the reader reports what the device says.

use crate::error::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Standard 18-byte USB device descriptor
///
/// A descriptor equal to [`DeviceDescriptor::default`] means no identity was
/// available for the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// bLength
    pub length: u8,
    /// bDescriptorType
    pub descriptor_type: u8,
    /// bcdUSB
    pub usb_version: u16,
    /// bDeviceClass
    pub class: u8,
    /// bDeviceSubClass
    pub subclass: u8,
    /// bDeviceProtocol
    pub protocol: u8,
    /// bMaxPacketSize0
    pub max_packet_size0: u8,
    /// idVendor
    pub vendor_id: u16,
    /// idProduct
    pub product_id: u16,
    /// bcdDevice
    pub device_version: u16,
    /// iManufacturer
    pub manufacturer_index: u8,
    /// iProduct
    pub product_index: u8,
    /// iSerialNumber
    pub serial_index: u8,
    /// bNumConfigurations
    pub num_configurations: u8,
}

impl DeviceDescriptor {
    /// Size of the descriptor on the wire
    pub const SIZE: usize = 18;

    /// True when every field is zero
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Read a descriptor in wire order
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            length: reader.read_u8()?,
            descriptor_type: reader.read_u8()?,
            usb_version: reader.read_u16::<LittleEndian>()?,
            class: reader.read_u8()?,
            subclass: reader.read_u8()?,
            protocol: reader.read_u8()?,
            max_packet_size0: reader.read_u8()?,
            vendor_id: reader.read_u16::<LittleEndian>()?,
            product_id: reader.read_u16::<LittleEndian>()?,
            device_version: reader.read_u16::<LittleEndian>()?,
            manufacturer_index: reader.read_u8()?,
            product_index: reader.read_u8()?,
            serial_index: reader.read_u8()?,
            num_configurations: reader.read_u8()?,
        })
    }

    /// Write the descriptor in wire order
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.length)?;
        writer.write_u8(self.descriptor_type)?;
        writer.write_u16::<LittleEndian>(self.usb_version)?;
        writer.write_u8(self.class)?;
        writer.write_u8(self.subclass)?;
        writer.write_u8(self.protocol)?;
        writer.write_u8(self.max_packet_size0)?;
        writer.write_u16::<LittleEndian>(self.vendor_id)?;
        writer.write_u16::<LittleEndian>(self.product_id)?;
        writer.write_u16::<LittleEndian>(self.device_version)?;
        writer.write_u8(self.manufacturer_index)?;
        writer.write_u8(self.product_index)?;
        writer.write_u8(self.serial_index)?;
        writer.write_u8(self.num_configurations)?;
        Ok(())
    }
}

/// Bus speed reported by the hub for a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceSpeed {
    /// 1.5 Mbps
    Low,
    /// 12 Mbps
    Full,
    /// 480 Mbps
    High,
    /// 5 Gbps and above
    Super,
    /// Value outside the known range
    Unknown(u8),
}

impl DeviceSpeed {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Low,
            1 => Self::Full,
            2 => Self::High,
            3 => Self::Super,
            other => Self::Unknown(other),
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Full => 1,
            Self::High => 2,
            Self::Super => 3,
            Self::Unknown(raw) => raw,
        }
    }
}

impl std::fmt::Display for DeviceSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low (1.5 Mbps)"),
            Self::Full => write!(f, "Full (12 Mbps)"),
            Self::High => write!(f, "High (480 Mbps)"),
            Self::Super => write!(f, "Super (5 Gbps+)"),
            Self::Unknown(raw) => write!(f, "Unknown ({})", raw),
        }
    }
}

/// State of a hub port as reported by the hub driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    NoDeviceConnected,
    DeviceConnected,
    DeviceFailedEnumeration,
    DeviceGeneralFailure,
    DeviceCausedOvercurrent,
    DeviceNotEnoughPower,
    DeviceNotEnoughBandwidth,
    DeviceHubNestedTooDeeply,
    DeviceInLegacyHub,
    DeviceEnumerating,
    DeviceReset,
    Other(u32),
}

impl ConnectionStatus {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::NoDeviceConnected,
            1 => Self::DeviceConnected,
            2 => Self::DeviceFailedEnumeration,
            3 => Self::DeviceGeneralFailure,
            4 => Self::DeviceCausedOvercurrent,
            5 => Self::DeviceNotEnoughPower,
            6 => Self::DeviceNotEnoughBandwidth,
            7 => Self::DeviceHubNestedTooDeeply,
            8 => Self::DeviceInLegacyHub,
            9 => Self::DeviceEnumerating,
            10 => Self::DeviceReset,
            other => Self::Other(other),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Self::NoDeviceConnected => 0,
            Self::DeviceConnected => 1,
            Self::DeviceFailedEnumeration => 2,
            Self::DeviceGeneralFailure => 3,
            Self::DeviceCausedOvercurrent => 4,
            Self::DeviceNotEnoughPower => 5,
            Self::DeviceNotEnoughBandwidth => 6,
            Self::DeviceHubNestedTooDeeply => 7,
            Self::DeviceInLegacyHub => 8,
            Self::DeviceEnumerating => 9,
            Self::DeviceReset => 10,
            Self::Other(raw) => raw,
        }
    }
}

/// Port details decoded alongside the device descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDetails {
    pub speed: DeviceSpeed,
    pub device_address: u16,
    pub device_is_hub: bool,
    pub status: ConnectionStatus,
    pub open_pipes: u32,
    pub current_configuration: u8,
}

/// One enumerated device
///
/// Either fully populated or never produced; see the enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Platform interface path of the device
    pub device_path: String,
    /// Device descriptor, all zero if the hub could not provide it
    pub descriptor: DeviceDescriptor,
    /// Manufacturer string, empty if absent
    pub manufacturer: String,
    /// Serial number string, empty if absent
    pub serial: String,
    /// Product string, empty if absent
    pub product: String,
    /// Hub port the device is attached to
    pub port: u32,
    /// Control path of the owning hub
    pub hub_path: String,
    /// Extra port details, when the hub returned them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_descriptor_wire_order() {
        // SanDisk Cruzer, iManufacturer=1 iProduct=2 iSerial=3
        let bytes = [
            0x12, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x40, 0x81, 0x07, 0x51, 0x55, 0x00, 0x01,
            0x01, 0x02, 0x03, 0x01,
        ];
        let descriptor = DeviceDescriptor::read_from(&mut Cursor::new(&bytes[..])).unwrap();
        assert_eq!(descriptor.usb_version, 0x0200);
        assert_eq!(descriptor.vendor_id, 0x0781);
        assert_eq!(descriptor.product_id, 0x5551);
        assert_eq!(descriptor.device_version, 0x0100);
        assert_eq!(descriptor.manufacturer_index, 1);
        assert_eq!(descriptor.product_index, 2);
        assert_eq!(descriptor.serial_index, 3);

        let mut out = Vec::new();
        descriptor.write_to(&mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_short_descriptor_fails() {
        let bytes = [0x12, 0x01, 0x00];
        assert!(DeviceDescriptor::read_from(&mut Cursor::new(&bytes[..])).is_err());
    }

    #[test]
    fn test_default_descriptor_is_empty() {
        assert!(DeviceDescriptor::default().is_empty());
        let descriptor = DeviceDescriptor {
            vendor_id: 1,
            ..Default::default()
        };
        assert!(!descriptor.is_empty());
    }

    #[test]
    fn test_speed_raw_values() {
        assert_eq!(DeviceSpeed::from_raw(2), DeviceSpeed::High);
        assert_eq!(DeviceSpeed::from_raw(9), DeviceSpeed::Unknown(9));
        assert_eq!(DeviceSpeed::Unknown(9).to_raw(), 9);
        assert_eq!(DeviceSpeed::Super.to_raw(), 3);
    }

    #[test]
    fn test_connection_status_raw_values() {
        assert_eq!(
            ConnectionStatus::from_raw(1),
            ConnectionStatus::DeviceConnected
        );
        assert_eq!(ConnectionStatus::from_raw(42), ConnectionStatus::Other(42));
        assert_eq!(ConnectionStatus::DeviceReset.to_raw(), 10);
    }

    #[test]
    fn test_record_json_omits_missing_connection() {
        let record = DeviceRecord {
            device_path: "usb:1-4".to_string(),
            descriptor: DeviceDescriptor::default(),
            manufacturer: String::new(),
            serial: String::new(),
            product: String::new(),
            port: 4,
            hub_path: "usb:1".to_string(),
            connection: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("connection").is_none());
        assert_eq!(json["port"], 4);
        assert_eq!(json["descriptor"]["vendor_id"], 0);

        let parsed: DeviceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }
}
