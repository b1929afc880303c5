//! Device enumeration pass
//!
//! Walks one interface class and, for every present device, resolves the
//! owning hub and port and reads the descriptor and strings through that hub.
//! Candidates that cannot be placed on a hub are dropped; descriptor and
//! string failures only leave fields empty.

use crate::location::{LocationError, parse_port};
use crate::usb::descriptors::DescriptorFetcher;
use crate::usb::hub::HubPathResolver;
use common::{DevicePlatform, DeviceSnapshot, Error, InterfaceClass, NodeId, RegistryProperty};
use protocol::{DeviceRecord, LANGUAGE_US_ENGLISH, decode_utf16_le};
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

/// Knobs for one enumeration pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumerationOptions {
    /// Interface class to walk
    pub interface: InterfaceClass,
    /// Language id for string requests
    pub language_id: u16,
    /// Return an empty string for index 0 without asking the hub
    pub skip_zero_string_index: bool,
    /// Remember hub paths per parent node for the rest of the pass
    pub cache_hub_paths: bool,
}

impl Default for EnumerationOptions {
    fn default() -> Self {
        Self {
            interface: InterfaceClass::Device,
            language_id: LANGUAGE_US_ENGLISH,
            skip_zero_string_index: true,
            cache_hub_paths: true,
        }
    }
}

/// Why a candidate never became a record
#[derive(Debug, ThisError)]
enum SkipReason {
    #[error("interface detail unavailable: {0}")]
    InterfaceDetail(Error),

    #[error("empty interface path")]
    EmptyPath,

    #[error("no location information")]
    MissingLocation,

    #[error("no parent node")]
    NoParent,

    #[error("hub {0} has no reachable control path")]
    HubUnreachable(NodeId),

    #[error(transparent)]
    MalformedLocation(#[from] LocationError),
}

/// Drives the hub resolver and descriptor fetcher over one interface class
pub struct DeviceEnumerator<'a, P: DevicePlatform> {
    platform: &'a P,
    options: EnumerationOptions,
}

impl<'a, P: DevicePlatform> DeviceEnumerator<'a, P> {
    pub fn new(platform: &'a P, options: EnumerationOptions) -> Self {
        Self { platform, options }
    }

    /// Run one pass, returning records in snapshot order
    ///
    /// Only a snapshot that cannot be opened fails the pass.
    pub fn enumerate(&self) -> common::Result<Vec<DeviceRecord>> {
        let class = self.options.interface;
        let mut snapshot = self.platform.open_snapshot(class).map_err(|e| match e {
            Error::SnapshotUnavailable { .. } => e,
            other => Error::SnapshotUnavailable {
                class,
                reason: other.to_string(),
            },
        })?;

        let mut resolver = if self.options.cache_hub_paths {
            HubPathResolver::with_cache(self.platform)
        } else {
            HubPathResolver::new(self.platform)
        };
        let fetcher = DescriptorFetcher::new(self.platform)
            .language(self.options.language_id)
            .skip_zero_index(self.options.skip_zero_string_index);

        let mut records = Vec::new();
        let mut dropped = 0usize;

        while let Some(entry) = snapshot.next_entry() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping {} entry: {}", class, e);
                    dropped += 1;
                    continue;
                }
            };

            match self.read_entry(&snapshot, &entry, &mut resolver, &fetcher) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    debug!("Dropping {}: {}", snapshot.device_node(&entry), reason);
                    dropped += 1;
                }
            }
        }

        info!(
            "Enumerated {} interface class: found={} dropped={}",
            class,
            records.len(),
            dropped
        );
        Ok(records)
    }

    fn read_entry(
        &self,
        snapshot: &P::Snapshot,
        entry: &<P::Snapshot as DeviceSnapshot>::Entry,
        resolver: &mut HubPathResolver<'a, P>,
        fetcher: &DescriptorFetcher<'a, P>,
    ) -> Result<DeviceRecord, SkipReason> {
        let device_path = snapshot
            .interface_path(entry)
            .map_err(SkipReason::InterfaceDetail)?;
        if device_path.is_empty() {
            return Err(SkipReason::EmptyPath);
        }

        let location = snapshot
            .registry_property(entry, RegistryProperty::LocationInformation)
            .map(|raw| decode_utf16_le(&raw))
            .ok_or(SkipReason::MissingLocation)?;

        let parent = self
            .platform
            .parent_node(snapshot.device_node(entry))
            .ok_or(SkipReason::NoParent)?;

        let hub_path = resolver
            .resolve(parent)
            .ok_or(SkipReason::HubUnreachable(parent))?;

        let port = parse_port(&location)?;

        let connection = fetcher.get_connection_info(&hub_path, port);
        let descriptor = connection
            .map(|info| info.device_descriptor)
            .unwrap_or_default();

        let manufacturer =
            fetcher.get_string_descriptor(&hub_path, port, descriptor.manufacturer_index);
        let serial = fetcher.get_string_descriptor(&hub_path, port, descriptor.serial_index);
        let product = fetcher.get_string_descriptor(&hub_path, port, descriptor.product_index);

        debug!(
            "{:04x}:{:04x} on port {} of {}",
            descriptor.vendor_id, descriptor.product_id, port, hub_path
        );

        Ok(DeviceRecord {
            device_path,
            descriptor,
            manufacturer,
            serial,
            product,
            port,
            hub_path,
            connection: connection.map(|info| info.details()),
        })
    }
}

/// Enumerate `class` with default options
pub fn enumerate_devices<P: DevicePlatform>(
    platform: &P,
    class: InterfaceClass,
) -> common::Result<Vec<DeviceRecord>> {
    let options = EnumerationOptions {
        interface: class,
        ..EnumerationOptions::default()
    };
    DeviceEnumerator::new(platform, options).enumerate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{FakeDevice, FakePlatform, ROOT_HUB_PATH, create_mock_descriptor};

    #[test]
    fn test_default_options() {
        let options = EnumerationOptions::default();
        assert_eq!(options.interface, InterfaceClass::Device);
        assert_eq!(options.language_id, 1033);
        assert!(options.skip_zero_string_index);
        assert!(options.cache_hub_paths);
    }

    #[test]
    fn test_skip_reason_messages() {
        assert_eq!(SkipReason::NoParent.to_string(), "no parent node");
        assert_eq!(
            SkipReason::HubUnreachable(NodeId(3)).to_string(),
            "hub node#3 has no reachable control path"
        );
        let malformed: SkipReason = LocationError::EmptyPort("#.".to_string()).into();
        assert_eq!(malformed.to_string(), "location '#.' has an empty port number");
    }

    #[test]
    fn test_custom_language_still_reads_strings() {
        let mut platform = FakePlatform::new();
        let hub = platform.add(FakeDevice::hub(ROOT_HUB_PATH));
        platform.add(
            FakeDevice::new("dev", create_mock_descriptor(0x1234, 0x0001, 1, 0, 0))
                .attached(hub, 3)
                .string(1, "Acme"),
        );

        let options = EnumerationOptions {
            language_id: 0x0407,
            ..EnumerationOptions::default()
        };
        let records = DeviceEnumerator::new(&platform, options).enumerate().unwrap();
        assert_eq!(records[0].manufacturer, "Acme");
        assert_eq!(records[0].port, 3);
    }

    #[test]
    fn test_hub_class_enumerates_hubs() {
        let mut platform = FakePlatform::new();
        let root = platform.add(FakeDevice::hub(ROOT_HUB_PATH));
        platform.add(FakeDevice::hub(r"\\?\usb#ext_hub").attached(root, 2));

        let records = enumerate_devices(&platform, InterfaceClass::Hub).unwrap();
        // the root hub has no parent and is dropped
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].device_path, r"\\?\usb#ext_hub");
        assert_eq!(records[0].hub_path, ROOT_HUB_PATH);
        assert!(records[0].connection.unwrap().device_is_hub);
    }
}
