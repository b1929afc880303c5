//! Windows backend
//!
//! SetupAPI device-information sets for snapshots, the configuration manager
//! for the device tree, and hub IOCTLs over `CreateFileW`/`DeviceIoControl`.

use common::{
    ControlChannel, DevicePlatform, DeviceSnapshot, Error, InterfaceClass, NodeId,
    RegistryProperty, Result,
};
use protocol::{HubIoctl, ProtocolError};
use std::mem::{offset_of, size_of};
use tracing::debug;
use windows::Win32::Devices::DeviceAndDriverInstallation::{
    CM_Get_Parent, CR_SUCCESS, DIGCF_DEVICEINTERFACE, DIGCF_PRESENT, HDEVINFO,
    SP_DEVICE_INTERFACE_DATA, SP_DEVICE_INTERFACE_DETAIL_DATA_W, SP_DEVINFO_DATA,
    SPDRP_LOCATION_INFORMATION, SetupDiDestroyDeviceInfoList, SetupDiEnumDeviceInterfaces,
    SetupDiGetClassDevsW, SetupDiGetDeviceInterfaceDetailW, SetupDiGetDeviceRegistryPropertyW,
};
use windows::Win32::Devices::Usb::{GUID_DEVINTERFACE_USB_DEVICE, GUID_DEVINTERFACE_USB_HUB};
use windows::Win32::Foundation::{
    CloseHandle, ERROR_NO_MORE_ITEMS, GENERIC_READ, GENERIC_WRITE, HANDLE,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::IO::DeviceIoControl;
use windows::core::{GUID, HSTRING, PCWSTR};

fn interface_guid(class: InterfaceClass) -> GUID {
    match class {
        InterfaceClass::Device => GUID_DEVINTERFACE_USB_DEVICE,
        InterfaceClass::Hub => GUID_DEVINTERFACE_USB_HUB,
    }
}

/// Device platform backed by SetupAPI and the hub driver
pub struct WindowsPlatform;

impl WindowsPlatform {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }
}

impl DevicePlatform for WindowsPlatform {
    type Snapshot = WindowsSnapshot;
    type Channel = WindowsChannel;

    fn open_snapshot(&self, class: InterfaceClass) -> Result<WindowsSnapshot> {
        let guid = interface_guid(class);
        let info_set = unsafe {
            SetupDiGetClassDevsW(
                Some(&guid as *const GUID),
                PCWSTR::null(),
                None,
                DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
            )
        }
        .map_err(|e| Error::SnapshotUnavailable {
            class,
            reason: e.to_string(),
        })?;

        Ok(WindowsSnapshot {
            info_set,
            guid,
            index: 0,
            exhausted: false,
        })
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        let mut parent = 0u32;
        let status = unsafe { CM_Get_Parent(&mut parent, node.0, 0) };
        if status != CR_SUCCESS {
            debug!("CM_Get_Parent({}) returned {}", node, status.0);
            return None;
        }
        Some(NodeId(parent))
    }

    fn open_control_channel(&self, path: &str) -> Result<WindowsChannel> {
        let handle = unsafe {
            CreateFileW(
                &HSTRING::from(path),
                GENERIC_READ.0 | GENERIC_WRITE.0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                None,
                OPEN_EXISTING,
                FILE_FLAGS_AND_ATTRIBUTES(0),
                None,
            )
        }
        .map_err(|e| Error::ChannelUnavailable {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        Ok(WindowsChannel {
            handle,
            path: path.to_string(),
        })
    }
}

/// One device interface and the device it belongs to
pub struct WindowsEntry {
    path: String,
    info: SP_DEVINFO_DATA,
}

/// A device-information set, destroyed on drop
pub struct WindowsSnapshot {
    info_set: HDEVINFO,
    guid: GUID,
    index: u32,
    exhausted: bool,
}

impl WindowsSnapshot {
    fn interface_detail(&self, interface: &SP_DEVICE_INTERFACE_DATA) -> Result<WindowsEntry> {
        let mut required = 0u32;
        // sizing call, fails with ERROR_INSUFFICIENT_BUFFER
        let _ = unsafe {
            SetupDiGetDeviceInterfaceDetailW(
                self.info_set,
                interface,
                None,
                0,
                Some(&mut required as *mut u32),
                None,
            )
        };

        let offset = offset_of!(SP_DEVICE_INTERFACE_DETAIL_DATA_W, DevicePath);
        let required_len = required as usize;
        if required_len <= offset {
            return Err(Error::Platform(format!(
                "interface {} has no detail data",
                self.index
            )));
        }

        // u64 backing keeps the detail struct aligned
        let mut buffer = vec![0u64; required_len.div_ceil(size_of::<u64>())];
        let detail = buffer.as_mut_ptr().cast::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>();
        let mut info = SP_DEVINFO_DATA {
            cbSize: size_of::<SP_DEVINFO_DATA>() as u32,
            ..Default::default()
        };

        unsafe {
            (*detail).cbSize = size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() as u32;
            SetupDiGetDeviceInterfaceDetailW(
                self.info_set,
                interface,
                Some(detail),
                required,
                None,
                Some(&mut info as *mut SP_DEVINFO_DATA),
            )
        }
        .map_err(|e| Error::Platform(format!("interface detail failed: {}", e)))?;

        let units = unsafe {
            std::slice::from_raw_parts(
                detail.cast::<u8>().add(offset).cast::<u16>(),
                (required_len - offset) / 2,
            )
        };
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());

        Ok(WindowsEntry {
            path: String::from_utf16_lossy(&units[..end]),
            info,
        })
    }
}

impl DeviceSnapshot for WindowsSnapshot {
    type Entry = WindowsEntry;

    fn next_entry(&mut self) -> Option<Result<WindowsEntry>> {
        if self.exhausted {
            return None;
        }

        let mut interface = SP_DEVICE_INTERFACE_DATA {
            cbSize: size_of::<SP_DEVICE_INTERFACE_DATA>() as u32,
            ..Default::default()
        };
        let index = self.index;
        self.index += 1;

        let enumerated = unsafe {
            SetupDiEnumDeviceInterfaces(self.info_set, None, &self.guid, index, &mut interface)
        };
        if let Err(e) = enumerated {
            if e.code() == ERROR_NO_MORE_ITEMS.to_hresult() {
                self.exhausted = true;
                return None;
            }
            return Some(Err(Error::Platform(format!(
                "interface {} enumeration failed: {}",
                index, e
            ))));
        }

        Some(self.interface_detail(&interface))
    }

    fn interface_path(&self, entry: &WindowsEntry) -> Result<String> {
        Ok(entry.path.clone())
    }

    fn registry_property(&self, entry: &WindowsEntry, property: RegistryProperty) -> Option<Vec<u8>> {
        let property = match property {
            RegistryProperty::LocationInformation => SPDRP_LOCATION_INFORMATION,
        };

        let mut required = 0u32;
        let _ = unsafe {
            SetupDiGetDeviceRegistryPropertyW(
                self.info_set,
                &entry.info,
                property,
                None,
                None,
                Some(&mut required as *mut u32),
            )
        };
        if required == 0 {
            return None;
        }

        let mut buffer = vec![0u8; required as usize];
        unsafe {
            SetupDiGetDeviceRegistryPropertyW(
                self.info_set,
                &entry.info,
                property,
                None,
                Some(buffer.as_mut_slice()),
                None,
            )
        }
        .ok()?;
        Some(buffer)
    }

    fn device_node(&self, entry: &WindowsEntry) -> NodeId {
        NodeId(entry.info.DevInst)
    }
}

impl Drop for WindowsSnapshot {
    fn drop(&mut self) {
        if let Err(e) = unsafe { SetupDiDestroyDeviceInfoList(self.info_set) } {
            debug!("SetupDiDestroyDeviceInfoList failed: {}", e);
        }
    }
}

/// An open hub handle, closed on drop
pub struct WindowsChannel {
    handle: HANDLE,
    path: String,
}

impl ControlChannel for WindowsChannel {
    fn send_control_request(
        &mut self,
        request: HubIoctl,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize> {
        if output.len() < input.len() {
            return Err(ProtocolError::BufferTooSmall {
                needed: input.len(),
                available: output.len(),
            }
            .into());
        }

        // the hub driver reads the request from and writes the answer to one buffer
        output[..input.len()].copy_from_slice(input);
        let mut returned = 0u32;
        unsafe {
            DeviceIoControl(
                self.handle,
                request.code(),
                Some(output.as_ptr().cast()),
                input.len() as u32,
                Some(output.as_mut_ptr().cast()),
                output.len() as u32,
                Some(&mut returned as *mut u32),
                None,
            )
        }
        .map_err(|e| {
            Error::Request(format!(
                "IOCTL {:#010x} on {} failed: {}",
                request.code(),
                self.path,
                e
            ))
        })?;

        Ok(returned as usize)
    }
}

impl Drop for WindowsChannel {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.handle) } {
            debug!("CloseHandle for {} failed: {}", self.path, e);
        }
    }
}
