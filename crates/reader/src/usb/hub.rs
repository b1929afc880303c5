//! Hub control-path resolution
//!
//! A device is enumerated through the device interface class, but its
//! descriptors can only be read through the hub it hangs off. The hub is known
//! by its device-tree node; its control path comes from scanning the hub
//! interface class for the entry with that node.

use common::{DevicePlatform, DeviceSnapshot, InterfaceClass, NodeId};
use std::collections::HashMap;
use tracing::debug;

/// Find the control-channel path of the hub at `hub_node`
///
/// Returns `None` when no present hub has that node, when the hub snapshot
/// cannot be opened, or when the matching entry has no usable path.
pub fn resolve_hub_path<P: DevicePlatform>(platform: &P, hub_node: NodeId) -> Option<String> {
    let mut snapshot = match platform.open_snapshot(InterfaceClass::Hub) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            debug!("Cannot scan hubs for {}: {}", hub_node, e);
            return None;
        }
    };

    while let Some(entry) = snapshot.next_entry() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping hub entry: {}", e);
                continue;
            }
        };

        if snapshot.device_node(&entry) != hub_node {
            continue;
        }

        return match snapshot.interface_path(&entry) {
            Ok(path) if !path.is_empty() => Some(path),
            Ok(_) => {
                debug!("Hub {} has an empty interface path", hub_node);
                None
            }
            Err(e) => {
                debug!("Hub {} interface path unavailable: {}", hub_node, e);
                None
            }
        };
    }

    debug!("No hub interface found for {}", hub_node);
    None
}

/// Hub path resolver with an optional per-pass cache
///
/// Caching is keyed by node id and remembers misses as well as hits, so a
/// pass scans the hub class at most once per distinct parent.
pub struct HubPathResolver<'a, P: DevicePlatform> {
    platform: &'a P,
    cache: Option<HashMap<NodeId, Option<String>>>,
}

impl<'a, P: DevicePlatform> HubPathResolver<'a, P> {
    /// Resolver that rescans the hub class on every call
    pub fn new(platform: &'a P) -> Self {
        Self {
            platform,
            cache: None,
        }
    }

    /// Resolver that remembers each node's answer
    pub fn with_cache(platform: &'a P) -> Self {
        Self {
            platform,
            cache: Some(HashMap::new()),
        }
    }

    pub fn resolve(&mut self, hub_node: NodeId) -> Option<String> {
        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(&hub_node)) {
            return hit.clone();
        }

        let resolved = resolve_hub_path(self.platform, hub_node);

        if let Some(cache) = self.cache.as_mut() {
            cache.insert(hub_node, resolved.clone());
        }
        resolved
    }
}
