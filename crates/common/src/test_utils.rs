//! Test utilities for the USB descriptor reader
//!
//! Provides an in-memory [`FakePlatform`] that models a device tree of hubs
//! and devices, answers hub control requests the way a hub driver does, and
//! records every snapshot, channel and request so tests can assert on them.
//!
//! # Example
//!
//! ```
//! use common::platform::{DevicePlatform, InterfaceClass};
//! use common::test_utils::{FakeDevice, FakePlatform, ROOT_HUB_PATH, create_mock_descriptor};
//!
//! let mut platform = FakePlatform::new();
//! let hub = platform.add(FakeDevice::hub(ROOT_HUB_PATH));
//! platform.add(
//!     FakeDevice::new("usb#vid_1234", create_mock_descriptor(0x1234, 0x5678, 1, 2, 3))
//!         .attached(hub, 4)
//!         .string(1, "Acme"),
//! );
//!
//! assert!(platform.open_snapshot(InterfaceClass::Device).is_ok());
//! assert_eq!(platform.parent_node(hub), None);
//! ```

use crate::error::{Error, Result};
use crate::platform::{
    ControlChannel, DevicePlatform, DeviceSnapshot, InterfaceClass, NodeId, RegistryProperty,
};
use protocol::{
    DEVICE_DESCRIPTOR_TYPE, DescriptorRequest, DeviceDescriptor, DeviceRecord, HUB_CLASS_CODE,
    HubIoctl, NodeConnectionInfo, ProtocolError, STRING_DESCRIPTOR_TYPE, encode_string_descriptor,
    encode_utf16_le_z,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Interface path used for the root hub in tests
pub const ROOT_HUB_PATH: &str =
    r"\\?\usb#root_hub30#4&2a3b4c5d&0&0#{f18a0e88-c30c-11d0-8815-00a0c906bed8}";

/// Language table a device returns for string index 0 (US English only)
const LANGUAGE_TABLE: [u8; 4] = [4, STRING_DESCRIPTOR_TYPE, 0x09, 0x04];

/// Create a plausible device descriptor
///
/// # Arguments
/// * `vendor_id` - idVendor
/// * `product_id` - idProduct
/// * `manufacturer_index` - iManufacturer
/// * `product_index` - iProduct
/// * `serial_index` - iSerialNumber
pub fn create_mock_descriptor(
    vendor_id: u16,
    product_id: u16,
    manufacturer_index: u8,
    product_index: u8,
    serial_index: u8,
) -> DeviceDescriptor {
    DeviceDescriptor {
        length: DeviceDescriptor::SIZE as u8,
        descriptor_type: DEVICE_DESCRIPTOR_TYPE,
        usb_version: 0x0200,
        class: 0x00,
        subclass: 0x00,
        protocol: 0x00,
        max_packet_size0: 64,
        vendor_id,
        product_id,
        device_version: 0x0100,
        manufacturer_index,
        product_index,
        serial_index,
        num_configurations: 1,
    }
}

/// Create a populated device record
pub fn create_mock_record(path: &str, vendor_id: u16, product_id: u16) -> DeviceRecord {
    DeviceRecord {
        device_path: path.to_string(),
        descriptor: create_mock_descriptor(vendor_id, product_id, 1, 2, 3),
        manufacturer: "Test Manufacturer".to_string(),
        serial: format!("SN{:04X}{:04X}", vendor_id, product_id),
        product: "Test Product".to_string(),
        port: 1,
        hub_path: ROOT_HUB_PATH.to_string(),
        connection: None,
    }
}

/// A device or hub in the fake device tree
#[derive(Debug, Clone)]
pub struct FakeDevice {
    path: String,
    is_hub: bool,
    parent: Option<NodeId>,
    port: u32,
    location: Option<String>,
    descriptor: DeviceDescriptor,
    strings: HashMap<u8, String>,
    broken_entry: bool,
    stalls_strings: bool,
}

impl FakeDevice {
    /// A non-hub device with the given interface path and descriptor
    pub fn new(path: &str, descriptor: DeviceDescriptor) -> Self {
        Self {
            path: path.to_string(),
            is_hub: false,
            parent: None,
            port: 0,
            location: None,
            descriptor,
            strings: HashMap::new(),
            broken_entry: false,
            stalls_strings: false,
        }
    }

    /// A hub with the given control-channel path
    pub fn hub(path: &str) -> Self {
        let mut descriptor = create_mock_descriptor(0x8086, 0x8c31, 0, 0, 0);
        descriptor.class = HUB_CLASS_CODE;
        Self {
            is_hub: true,
            ..Self::new(path, descriptor)
        }
    }

    /// Attach to `parent` on `port`, with the matching location text
    pub fn attached(mut self, parent: NodeId, port: u32) -> Self {
        self.parent = Some(parent);
        self.port = port;
        self.location = Some(format!("Port_#{:04}.Hub_#{:04}", port, parent.0));
        self
    }

    /// Override the location property (`None` removes it)
    pub fn location(mut self, location: Option<&str>) -> Self {
        self.location = location.map(str::to_string);
        self
    }

    /// Drop the parent link while keeping port and location
    pub fn orphan(mut self) -> Self {
        self.parent = None;
        self
    }

    /// Answer string index `index` with `text`
    pub fn string(mut self, index: u8, text: &str) -> Self {
        self.strings.insert(index, text.to_string());
        self
    }

    /// Make the snapshot fail while producing this entry
    pub fn broken_entry(mut self) -> Self {
        self.broken_entry = true;
        self
    }

    /// Stall every string descriptor request
    pub fn stalls_strings(mut self) -> Self {
        self.stalls_strings = true;
        self
    }
}

/// A request seen by a fake hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeRequest {
    pub hub_path: String,
    pub ioctl: HubIoctl,
    pub port: u32,
    pub string_index: Option<u8>,
}

/// Everything the fake platform was asked to do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeLog {
    pub snapshots_opened: Vec<InterfaceClass>,
    pub channels_opened: usize,
    pub channels_closed: usize,
    pub requests: Vec<FakeRequest>,
}

impl FakeLog {
    /// Requests of one kind
    pub fn requests_of(&self, ioctl: HubIoctl) -> Vec<&FakeRequest> {
        self.requests.iter().filter(|r| r.ioctl == ioctl).collect()
    }

    /// Number of hub snapshots opened
    pub fn hub_scans(&self) -> usize {
        self.snapshots_opened
            .iter()
            .filter(|class| **class == InterfaceClass::Hub)
            .count()
    }
}

/// In-memory device tree implementing [`DevicePlatform`]
#[derive(Debug, Default)]
pub struct FakePlatform {
    devices: Vec<(NodeId, FakeDevice)>,
    failing_snapshots: Vec<InterfaceClass>,
    failing_channels: Vec<String>,
    log: Rc<RefCell<FakeLog>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device or hub, returning its node id (assigned from 1)
    pub fn add(&mut self, device: FakeDevice) -> NodeId {
        let node = NodeId(self.devices.len() as u32 + 1);
        self.devices.push((node, device));
        node
    }

    /// Make `open_snapshot(class)` fail
    pub fn fail_snapshot(&mut self, class: InterfaceClass) {
        self.failing_snapshots.push(class);
    }

    /// Make `open_control_channel(path)` fail
    pub fn fail_channel(&mut self, path: &str) {
        self.failing_channels.push(path.to_string());
    }

    /// Copy of the activity log
    pub fn log(&self) -> FakeLog {
        self.log.borrow().clone()
    }

    fn find(&self, node: NodeId) -> Option<&FakeDevice> {
        self.devices
            .iter()
            .find(|(id, _)| *id == node)
            .map(|(_, device)| device)
    }
}

/// Root hub with a keyboard on port 1 and a flash drive on port 4
pub fn create_sample_platform() -> FakePlatform {
    let mut platform = FakePlatform::new();
    let hub = platform.add(FakeDevice::hub(ROOT_HUB_PATH));
    platform.add(
        FakeDevice::new(
            r"\\?\usb#vid_046d&pid_c31c#6&1a2b3c4d&0&1#{a5dcbf10-6530-11d2-901f-00c04fb951ed}",
            create_mock_descriptor(0x046d, 0xc31c, 1, 2, 0),
        )
        .attached(hub, 1)
        .string(1, "Logitech")
        .string(2, "USB Keyboard"),
    );
    platform.add(
        FakeDevice::new(
            r"\\?\usb#vid_0781&pid_5567#4c530001230115117341#{a5dcbf10-6530-11d2-901f-00c04fb951ed}",
            create_mock_descriptor(0x0781, 0x5567, 1, 2, 3),
        )
        .attached(hub, 4)
        .string(1, "SanDisk")
        .string(2, "Cruzer Blade")
        .string(3, "4C530001230115117341"),
    );
    platform
}

impl DevicePlatform for FakePlatform {
    type Snapshot = FakeSnapshot;
    type Channel = FakeChannel;

    fn open_snapshot(&self, class: InterfaceClass) -> Result<FakeSnapshot> {
        self.log.borrow_mut().snapshots_opened.push(class);

        if self.failing_snapshots.contains(&class) {
            return Err(Error::SnapshotUnavailable {
                class,
                reason: "injected failure".to_string(),
            });
        }

        let wants_hubs = class == InterfaceClass::Hub;
        let entries: Vec<_> = self
            .devices
            .iter()
            .filter(|(_, device)| device.is_hub == wants_hubs)
            .cloned()
            .collect();

        Ok(FakeSnapshot {
            entries: entries.into_iter(),
        })
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.find(node).and_then(|device| device.parent)
    }

    fn open_control_channel(&self, path: &str) -> Result<FakeChannel> {
        let unavailable = |reason: &str| Error::ChannelUnavailable {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if self.failing_channels.iter().any(|p| p == path) {
            return Err(unavailable("injected failure"));
        }

        let hub = self
            .devices
            .iter()
            .find(|(_, device)| device.is_hub && device.path == path)
            .map(|(node, _)| *node)
            .ok_or_else(|| unavailable("no such hub"))?;

        let children = self
            .devices
            .iter()
            .filter(|(_, device)| device.parent == Some(hub))
            .map(|(_, device)| device.clone())
            .collect();

        self.log.borrow_mut().channels_opened += 1;

        Ok(FakeChannel {
            path: path.to_string(),
            children,
            log: Rc::clone(&self.log),
        })
    }
}

/// Entry yielded by [`FakeSnapshot`]
#[derive(Debug, Clone)]
pub struct FakeEntry {
    node: NodeId,
    device: FakeDevice,
}

/// Snapshot over a copy of the matching devices
#[derive(Debug)]
pub struct FakeSnapshot {
    entries: std::vec::IntoIter<(NodeId, FakeDevice)>,
}

impl DeviceSnapshot for FakeSnapshot {
    type Entry = FakeEntry;

    fn next_entry(&mut self) -> Option<Result<FakeEntry>> {
        let (node, device) = self.entries.next()?;
        if device.broken_entry {
            return Some(Err(Error::Platform(format!(
                "interface detail unavailable for {}",
                node
            ))));
        }
        Some(Ok(FakeEntry { node, device }))
    }

    fn interface_path(&self, entry: &FakeEntry) -> Result<String> {
        Ok(entry.device.path.clone())
    }

    fn registry_property(&self, entry: &FakeEntry, property: RegistryProperty) -> Option<Vec<u8>> {
        match property {
            RegistryProperty::LocationInformation => {
                entry.device.location.as_deref().map(encode_utf16_le_z)
            }
        }
    }

    fn device_node(&self, entry: &FakeEntry) -> NodeId {
        entry.node
    }
}

/// Control channel to a fake hub
#[derive(Debug)]
pub struct FakeChannel {
    path: String,
    children: Vec<FakeDevice>,
    log: Rc<RefCell<FakeLog>>,
}

impl FakeChannel {
    fn child(&self, port: u32) -> Result<&FakeDevice> {
        self.children
            .iter()
            .find(|device| device.port == port)
            .ok_or_else(|| Error::Request(format!("no device on port {}", port)))
    }

    fn record(&self, ioctl: HubIoctl, port: u32, string_index: Option<u8>) {
        self.log.borrow_mut().requests.push(FakeRequest {
            hub_path: self.path.clone(),
            ioctl,
            port,
            string_index,
        });
    }
}

impl ControlChannel for FakeChannel {
    fn send_control_request(
        &mut self,
        request: HubIoctl,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize> {
        match request {
            HubIoctl::GetNodeConnectionInformationEx => {
                let port = NodeConnectionInfo::requested_port(input)?;
                self.record(request, port, None);

                let child = self.child(port)?;
                let info = NodeConnectionInfo {
                    connection_index: port,
                    device_descriptor: child.descriptor,
                    current_configuration: 1,
                    speed: 2,
                    device_is_hub: child.is_hub,
                    device_address: port as u16 + 1,
                    open_pipes: 0,
                    connection_status: 1,
                };
                Ok(info.encode_into(output)?)
            }
            HubIoctl::GetDescriptorFromNodeConnection => {
                let header = DescriptorRequest::decode(input)?;
                let index = header.descriptor_index();
                self.record(request, header.connection_index, Some(index));

                let child = self.child(header.connection_index)?;
                if header.descriptor_type() != STRING_DESCRIPTOR_TYPE || child.stalls_strings {
                    return Err(Error::Request("endpoint stalled".to_string()));
                }

                let data = if index == 0 {
                    LANGUAGE_TABLE.to_vec()
                } else {
                    child
                        .strings
                        .get(&index)
                        .map(|text| encode_string_descriptor(text))
                        .ok_or_else(|| Error::Request("endpoint stalled".to_string()))?
                };

                let len = data.len().min(usize::from(header.setup.length));
                let needed = DescriptorRequest::HEADER_SIZE + len;
                if output.len() < needed {
                    return Err(ProtocolError::BufferTooSmall {
                        needed,
                        available: output.len(),
                    }
                    .into());
                }

                output[..DescriptorRequest::HEADER_SIZE]
                    .copy_from_slice(&input[..DescriptorRequest::HEADER_SIZE]);
                output[DescriptorRequest::HEADER_SIZE..needed].copy_from_slice(&data[..len]);
                Ok(needed)
            }
        }
    }
}

impl Drop for FakeChannel {
    fn drop(&mut self) {
        self.log.borrow_mut().channels_closed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mock_descriptor() {
        let descriptor = create_mock_descriptor(0x1234, 0x5678, 1, 2, 3);
        assert_eq!(descriptor.vendor_id, 0x1234);
        assert_eq!(descriptor.product_id, 0x5678);
        assert_eq!(descriptor.manufacturer_index, 1);
        assert_eq!(descriptor.product_index, 2);
        assert_eq!(descriptor.serial_index, 3);
        assert_eq!(descriptor.length, 18);
    }

    #[test]
    fn test_snapshot_splits_hubs_and_devices() {
        let platform = create_sample_platform();

        let mut hubs = platform.open_snapshot(InterfaceClass::Hub).unwrap();
        let mut hub_count = 0;
        while let Some(entry) = hubs.next_entry() {
            entry.unwrap();
            hub_count += 1;
        }
        assert_eq!(hub_count, 1);

        let mut devices = platform.open_snapshot(InterfaceClass::Device).unwrap();
        let mut device_count = 0;
        while let Some(entry) = devices.next_entry() {
            let entry = entry.unwrap();
            assert!(devices
                .registry_property(&entry, RegistryProperty::LocationInformation)
                .is_some());
            device_count += 1;
        }
        assert_eq!(device_count, 2);
        assert_eq!(platform.log().snapshots_opened.len(), 2);
    }

    #[test]
    fn test_channel_drop_is_logged() {
        let platform = create_sample_platform();
        {
            let _channel = platform.open_control_channel(ROOT_HUB_PATH).unwrap();
            assert_eq!(platform.log().channels_opened, 1);
            assert_eq!(platform.log().channels_closed, 0);
        }
        assert_eq!(platform.log().channels_closed, 1);
    }

    #[test]
    fn test_unknown_hub_path_fails() {
        let platform = create_sample_platform();
        assert!(platform.open_control_channel("").is_err());
        assert!(platform.open_control_channel(r"\\?\nope").is_err());
        assert_eq!(platform.log().channels_opened, 0);
    }

    #[test]
    fn test_fake_hub_answers_string_request() {
        let platform = create_sample_platform();
        let mut channel = platform.open_control_channel(ROOT_HUB_PATH).unwrap();

        let request = DescriptorRequest::string(4, 1, protocol::LANGUAGE_US_ENGLISH);
        let input = request.to_buffer().unwrap();
        let mut output = input.clone();
        let written = channel
            .send_control_request(HubIoctl::GetDescriptorFromNodeConnection, &input, &mut output)
            .unwrap();

        let text = protocol::decode_string_descriptor(
            &output[DescriptorRequest::HEADER_SIZE..written],
        )
        .unwrap();
        assert_eq!(text, "SanDisk");
    }

    #[test]
    fn test_fake_hub_rejects_empty_port() {
        let platform = create_sample_platform();
        let mut channel = platform.open_control_channel(ROOT_HUB_PATH).unwrap();
        let input = NodeConnectionInfo::request_buffer(9);
        let mut output = input.clone();
        assert!(channel
            .send_control_request(HubIoctl::GetNodeConnectionInformationEx, &input, &mut output)
            .is_err());
        assert_eq!(platform.log().requests.len(), 1);
    }
}
