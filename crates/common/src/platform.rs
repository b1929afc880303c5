//! Platform device-enumeration and hub-control services
//!
//! The descriptor pipeline only talks to the host through these traits. A
//! backend provides three things:
//!
//! - snapshots of the devices implementing an interface class, iterated once
//!   until they report no further entries
//! - the device tree, for finding a node's parent
//! - hub control channels, closed when dropped
//!
//! Every call returns an explicit result. There is no shared "last error".

use crate::error::{Error, Result};
use protocol::HubIoctl;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a node in the host's device tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Device interface classes the reader knows how to enumerate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceClass {
    /// USB devices (GUID_DEVINTERFACE_USB_DEVICE)
    Device,
    /// USB hubs (GUID_DEVINTERFACE_USB_HUB)
    Hub,
}

impl fmt::Display for InterfaceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Hub => write!(f, "hub"),
        }
    }
}

impl FromStr for InterfaceClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "device" => Ok(Self::Device),
            "hub" => Ok(Self::Hub),
            other => Err(Error::Config(format!(
                "Unknown interface class '{}', expected 'device' or 'hub'",
                other
            ))),
        }
    }
}

/// Registry properties a snapshot entry can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryProperty {
    /// Human-readable bus position, e.g. `Port_#0004.Hub_#0002`
    LocationInformation,
}

/// Host services used by the enumerator, hub resolver and fetcher
pub trait DevicePlatform {
    type Snapshot: DeviceSnapshot;
    type Channel: ControlChannel;

    /// Snapshot every present device implementing `class`
    fn open_snapshot(&self, class: InterfaceClass) -> Result<Self::Snapshot>;

    /// Parent of `node` in the device tree, `None` for a root
    fn parent_node(&self, node: NodeId) -> Option<NodeId>;

    /// Open a shared read/write control channel to the hub at `path`
    fn open_control_channel(&self, path: &str) -> Result<Self::Channel>;
}

/// One pass over a device-interface class
pub trait DeviceSnapshot {
    type Entry;

    /// Next entry, `None` once the snapshot is exhausted
    ///
    /// An `Err` only affects that entry; iteration may continue.
    fn next_entry(&mut self) -> Option<Result<Self::Entry>>;

    /// Interface path of the entry (for hubs, the control-channel path)
    fn interface_path(&self, entry: &Self::Entry) -> Result<String>;

    /// Raw registry property bytes, `None` when absent or unreadable
    fn registry_property(&self, entry: &Self::Entry, property: RegistryProperty)
    -> Option<Vec<u8>>;

    /// Device-tree node of the entry
    fn device_node(&self, entry: &Self::Entry) -> NodeId;
}

/// An open hub control channel
///
/// Implementations release the underlying handle in `Drop`.
pub trait ControlChannel {
    /// Send `request` with `input`, writing the answer into `output`
    ///
    /// Returns the number of bytes the hub wrote.
    fn send_control_request(
        &mut self,
        request: HubIoctl,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_class_from_str() {
        assert_eq!(
            "device".parse::<InterfaceClass>().unwrap(),
            InterfaceClass::Device
        );
        assert_eq!("HUB".parse::<InterfaceClass>().unwrap(), InterfaceClass::Hub);
        assert!("printer".parse::<InterfaceClass>().is_err());
    }

    #[test]
    fn test_interface_class_display_round_trips() {
        for class in [InterfaceClass::Device, InterfaceClass::Hub] {
            assert_eq!(class.to_string().parse::<InterfaceClass>().unwrap(), class);
        }
    }

    #[test]
    fn test_node_display() {
        assert_eq!(NodeId(17).to_string(), "node#17");
    }
}
