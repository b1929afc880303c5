//! USB descriptor pipeline
//!
//! - `hub`: maps a parent node to its hub's control path
//! - `descriptors`: device and string descriptor requests through a hub
//! - `enumerator`: the per-device pass tying both together

pub mod descriptors;
pub mod enumerator;
pub mod hub;

pub use descriptors::DescriptorFetcher;
pub use enumerator::{DeviceEnumerator, EnumerationOptions, enumerate_devices};
pub use hub::{HubPathResolver, resolve_hub_path};
