//! libusb backend
//!
//! Emulates the hub-driver contract on hosts without one:
//!
//! - interface paths are `usb:<bus>-<port>.<port>...` (`usb:<bus>` for a root hub)
//! - the location property is synthesised as `Port_#NNNN.Hub_#NNNN`
//! - node ids pack bus and address
//! - hub requests are answered from the child on the requested port, using its
//!   cached descriptor or a GET_DESCRIPTOR control transfer

use common::{
    ControlChannel, DevicePlatform, DeviceSnapshot, Error, InterfaceClass, NodeId,
    RegistryProperty, Result,
};
use protocol::{
    DEVICE_DESCRIPTOR_TYPE, DescriptorRequest, DeviceDescriptor, GET_DESCRIPTOR, HUB_CLASS_CODE,
    HubIoctl, NodeConnectionInfo, ProtocolError, REQUEST_TYPE_IN_STANDARD_DEVICE,
    encode_utf16_le_z,
};
use rusb::{Context, Device, UsbContext};
use std::time::Duration;
use tracing::debug;

/// Timeout for string descriptor control transfers
const CONTROL_TIMEOUT: Duration = Duration::from_secs(1);

/// `USB_CONNECTION_STATUS::DeviceConnected`
const DEVICE_CONNECTED: u32 = 1;

fn node_id(bus: u8, address: u8) -> NodeId {
    NodeId((u32::from(bus) << 8) | u32::from(address))
}

fn usb_path(bus: u8, ports: &[u8]) -> String {
    if ports.is_empty() {
        return format!("usb:{}", bus);
    }
    let ports: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
    format!("usb:{}-{}", bus, ports.join("."))
}

fn location_text(port: u8, hub_address: u8) -> String {
    format!("Port_#{:04}.Hub_#{:04}", port, hub_address)
}

/// Pack a libusb version into the descriptor's BCD `bcdUSB`/`bcdDevice` form
fn bcd_version(version: rusb::Version) -> u16 {
    let major = u16::from(version.major());
    ((major / 10) << 12)
        | ((major % 10) << 8)
        | (u16::from(version.minor() & 0x0f) << 4)
        | u16::from(version.sub_minor() & 0x0f)
}

/// Map a libusb speed to the hub driver's `USB_DEVICE_SPEED` code
fn speed_code(speed: rusb::Speed) -> u8 {
    match speed {
        rusb::Speed::Low => 0,
        rusb::Speed::Full => 1,
        rusb::Speed::High => 2,
        rusb::Speed::Super | rusb::Speed::SuperPlus => 3,
        _ => 1, // Default fallback
    }
}

fn platform_error(e: rusb::Error) -> Error {
    Error::Platform(e.to_string())
}

fn same_device<T: UsbContext>(a: &Device<T>, b: &Device<T>) -> bool {
    a.bus_number() == b.bus_number() && a.address() == b.address()
}

fn device_path<T: UsbContext>(device: &Device<T>) -> Result<String> {
    let ports = device.port_numbers().map_err(platform_error)?;
    Ok(usb_path(device.bus_number(), &ports))
}

fn convert_descriptor(descriptor: &rusb::DeviceDescriptor) -> DeviceDescriptor {
    DeviceDescriptor {
        length: DeviceDescriptor::SIZE as u8,
        descriptor_type: DEVICE_DESCRIPTOR_TYPE,
        usb_version: bcd_version(descriptor.usb_version()),
        class: descriptor.class_code(),
        subclass: descriptor.sub_class_code(),
        protocol: descriptor.protocol_code(),
        max_packet_size0: descriptor.max_packet_size(),
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        device_version: bcd_version(descriptor.device_version()),
        manufacturer_index: descriptor.manufacturer_string_index().unwrap_or(0),
        product_index: descriptor.product_string_index().unwrap_or(0),
        serial_index: descriptor.serial_number_string_index().unwrap_or(0),
        num_configurations: descriptor.num_configurations(),
    }
}

/// Device platform backed by a libusb context
pub struct LibusbPlatform {
    context: Context,
}

impl LibusbPlatform {
    pub fn new() -> Result<Self> {
        let context = Context::new().map_err(platform_error)?;
        Ok(Self { context })
    }

    fn devices(&self) -> Result<Vec<Device<Context>>> {
        let list = self.context.devices().map_err(platform_error)?;
        Ok(list.iter().collect())
    }
}

impl DevicePlatform for LibusbPlatform {
    type Snapshot = LibusbSnapshot;
    type Channel = LibusbChannel;

    fn open_snapshot(&self, class: InterfaceClass) -> Result<LibusbSnapshot> {
        let devices = self.devices().map_err(|e| Error::SnapshotUnavailable {
            class,
            reason: e.to_string(),
        })?;

        let entries: Vec<_> = devices
            .into_iter()
            .filter(|device| match class {
                // root hubs are host controllers, not attached devices
                InterfaceClass::Device => device.port_number() != 0,
                InterfaceClass::Hub => device
                    .device_descriptor()
                    .map(|d| d.class_code() == HUB_CLASS_CODE)
                    .unwrap_or(false),
            })
            .collect();

        debug!("libusb snapshot of {} class: {} entries", class, entries.len());
        Ok(LibusbSnapshot {
            entries: entries.into_iter(),
        })
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        let devices = self.devices().ok()?;
        let device = devices
            .iter()
            .find(|d| node_id(d.bus_number(), d.address()) == node)?;
        let parent = device.get_parent()?;
        Some(node_id(parent.bus_number(), parent.address()))
    }

    fn open_control_channel(&self, path: &str) -> Result<LibusbChannel> {
        let devices = self.devices().map_err(|e| Error::ChannelUnavailable {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let hub = devices
            .iter()
            .find(|d| device_path(d).ok().as_deref() == Some(path))
            .cloned()
            .ok_or_else(|| Error::ChannelUnavailable {
                path: path.to_string(),
                reason: "no such hub".to_string(),
            })?;

        let children = devices
            .into_iter()
            .filter(|d| d.get_parent().is_some_and(|parent| same_device(&parent, &hub)))
            .collect();

        Ok(LibusbChannel { children })
    }
}

/// One libusb device
pub struct LibusbEntry {
    device: Device<Context>,
}

pub struct LibusbSnapshot {
    entries: std::vec::IntoIter<Device<Context>>,
}

impl DeviceSnapshot for LibusbSnapshot {
    type Entry = LibusbEntry;

    fn next_entry(&mut self) -> Option<Result<LibusbEntry>> {
        self.entries.next().map(|device| Ok(LibusbEntry { device }))
    }

    fn interface_path(&self, entry: &LibusbEntry) -> Result<String> {
        device_path(&entry.device)
    }

    fn registry_property(&self, entry: &LibusbEntry, property: RegistryProperty) -> Option<Vec<u8>> {
        match property {
            RegistryProperty::LocationInformation => {
                let port = entry.device.port_number();
                if port == 0 {
                    return None;
                }
                let hub = entry.device.get_parent()?;
                Some(encode_utf16_le_z(&location_text(port, hub.address())))
            }
        }
    }

    fn device_node(&self, entry: &LibusbEntry) -> NodeId {
        node_id(entry.device.bus_number(), entry.device.address())
    }
}

/// A hub's downstream devices, keyed by port
pub struct LibusbChannel {
    children: Vec<Device<Context>>,
}

impl LibusbChannel {
    fn child(&self, port: u32) -> Result<&Device<Context>> {
        self.children
            .iter()
            .find(|d| u32::from(d.port_number()) == port)
            .ok_or_else(|| Error::Request(format!("no device on port {}", port)))
    }

    fn connection_info(&self, port: u32) -> Result<NodeConnectionInfo> {
        let child = self.child(port)?;
        let descriptor = child.device_descriptor().map_err(platform_error)?;

        let (open_pipes, current_configuration) = match child.active_config_descriptor() {
            Ok(config) => {
                let endpoints: usize = config
                    .interfaces()
                    .filter_map(|interface| interface.descriptors().next())
                    .map(|setting| setting.num_endpoints() as usize)
                    .sum();
                (endpoints as u32, config.number())
            }
            Err(_) => (0, 0),
        };

        Ok(NodeConnectionInfo {
            connection_index: port,
            device_descriptor: convert_descriptor(&descriptor),
            current_configuration,
            speed: speed_code(child.speed()),
            device_is_hub: descriptor.class_code() == HUB_CLASS_CODE,
            device_address: u16::from(child.address()),
            open_pipes,
            connection_status: DEVICE_CONNECTED,
        })
    }

    fn read_descriptor(&self, request: &DescriptorRequest, data: &mut [u8]) -> Result<usize> {
        let child = self.child(request.connection_index)?;
        let handle = child.open().map_err(|e| Error::Request(e.to_string()))?;
        handle
            .read_control(
                REQUEST_TYPE_IN_STANDARD_DEVICE,
                GET_DESCRIPTOR,
                request.setup.value,
                request.setup.index,
                data,
                CONTROL_TIMEOUT,
            )
            .map_err(|e| Error::Request(e.to_string()))
    }
}

impl ControlChannel for LibusbChannel {
    fn send_control_request(
        &mut self,
        request: HubIoctl,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize> {
        match request {
            HubIoctl::GetNodeConnectionInformationEx => {
                let port = NodeConnectionInfo::requested_port(input)?;
                let info = self.connection_info(port)?;
                Ok(info.encode_into(output)?)
            }
            HubIoctl::GetDescriptorFromNodeConnection => {
                let header = DescriptorRequest::decode(input)?;
                let needed = DescriptorRequest::HEADER_SIZE + usize::from(header.setup.length);
                if output.len() < needed {
                    return Err(ProtocolError::BufferTooSmall {
                        needed,
                        available: output.len(),
                    }
                    .into());
                }

                output[..DescriptorRequest::HEADER_SIZE]
                    .copy_from_slice(&input[..DescriptorRequest::HEADER_SIZE]);
                let data = &mut output[DescriptorRequest::HEADER_SIZE..needed];
                let read = self.read_descriptor(&header, data)?;
                Ok(DescriptorRequest::HEADER_SIZE + read)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_packs_bus_and_address() {
        assert_eq!(node_id(1, 5), NodeId(0x0105));
        assert_eq!(node_id(3, 0xff), NodeId(0x03ff));
        assert_ne!(node_id(1, 2), node_id(2, 1));
    }

    #[test]
    fn test_usb_path() {
        assert_eq!(usb_path(1, &[]), "usb:1");
        assert_eq!(usb_path(1, &[4]), "usb:1-4");
        assert_eq!(usb_path(2, &[1, 3, 2]), "usb:2-1.3.2");
    }

    #[test]
    fn test_location_text_parses_back() {
        let text = location_text(4, 2);
        assert_eq!(text, "Port_#0004.Hub_#0002");
        assert_eq!(crate::location::parse_port(&text).unwrap(), 4);
        assert_eq!(
            crate::location::parse_port(&location_text(255, 127)).unwrap(),
            255
        );
    }

    #[test]
    fn test_bcd_version() {
        assert_eq!(bcd_version(rusb::Version(2, 0, 0)), 0x0200);
        assert_eq!(bcd_version(rusb::Version(1, 1, 0)), 0x0110);
        assert_eq!(bcd_version(rusb::Version(3, 2, 0)), 0x0320);
        assert_eq!(bcd_version(rusb::Version(12, 3, 4)), 0x1234);
    }

    #[test]
    fn test_speed_code() {
        assert_eq!(speed_code(rusb::Speed::Low), 0);
        assert_eq!(speed_code(rusb::Speed::Full), 1);
        assert_eq!(speed_code(rusb::Speed::High), 2);
        assert_eq!(speed_code(rusb::Speed::Super), 3);
        assert_eq!(speed_code(rusb::Speed::SuperPlus), 3);
        assert_eq!(speed_code(rusb::Speed::Unknown), 1);
    }
}
