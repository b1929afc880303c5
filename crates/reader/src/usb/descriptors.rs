//! Descriptor requests routed through a hub
//!
//! Every request opens the hub's control channel, sends a single buffer that
//! doubles as the response area, and drops the channel before returning. A
//! channel is never held across requests so other processes querying the same
//! hub are not locked out.
//!
//! Failures here are soft: a missing descriptor comes back all zero and a
//! missing string comes back empty.

use common::{ControlChannel, DevicePlatform, Error, Result};
use protocol::{
    DescriptorRequest, DeviceDescriptor, HubIoctl, LANGUAGE_US_ENGLISH, NodeConnectionInfo,
    decode_string_descriptor,
};
use tracing::debug;

/// Issues descriptor requests against a hub's control channel
pub struct DescriptorFetcher<'a, P: DevicePlatform> {
    platform: &'a P,
    language_id: u16,
    skip_zero_index: bool,
}

impl<'a, P: DevicePlatform> DescriptorFetcher<'a, P> {
    /// Fetcher asking for US English strings and skipping index 0
    pub fn new(platform: &'a P) -> Self {
        Self {
            platform,
            language_id: LANGUAGE_US_ENGLISH,
            skip_zero_index: true,
        }
    }

    /// Language id sent in the setup packet's wIndex
    pub fn language(mut self, language_id: u16) -> Self {
        self.language_id = language_id;
        self
    }

    /// Whether string index 0 short-circuits without a request
    pub fn skip_zero_index(mut self, skip: bool) -> Self {
        self.skip_zero_index = skip;
        self
    }

    /// Send one request with `buffer` as both input and output
    fn request(&self, hub_path: &str, ioctl: HubIoctl, buffer: &mut [u8]) -> Result<usize> {
        if hub_path.is_empty() {
            return Err(Error::ChannelUnavailable {
                path: String::new(),
                reason: "empty hub path".to_string(),
            });
        }

        let mut channel = self.platform.open_control_channel(hub_path)?;
        let input = buffer.to_vec();
        let written = channel.send_control_request(ioctl, &input, buffer)?;
        Ok(written.min(buffer.len()))
    }

    /// Full node-connection information for the device on `port`
    pub fn get_connection_info(&self, hub_path: &str, port: u32) -> Option<NodeConnectionInfo> {
        let mut buffer = NodeConnectionInfo::request_buffer(port);

        let written = match self.request(
            hub_path,
            HubIoctl::GetNodeConnectionInformationEx,
            &mut buffer,
        ) {
            Ok(written) => written,
            Err(e) => {
                debug!("Connection info for port {} on {} failed: {}", port, hub_path, e);
                return None;
            }
        };

        match NodeConnectionInfo::decode(&buffer[..written]) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("Connection info for port {} on {} unusable: {}", port, hub_path, e);
                None
            }
        }
    }

    /// Device descriptor of the device on `port`, all zero on failure
    pub fn get_device_descriptor(&self, hub_path: &str, port: u32) -> DeviceDescriptor {
        self.get_connection_info(hub_path, port)
            .map(|info| info.device_descriptor)
            .unwrap_or_default()
    }

    /// String descriptor `index` of the device on `port`, empty on failure
    ///
    /// Index 0 addresses the language table, not text, so it always yields
    /// an empty string.
    pub fn get_string_descriptor(&self, hub_path: &str, port: u32, index: u8) -> String {
        if index == 0 && self.skip_zero_index {
            return String::new();
        }

        let request = DescriptorRequest::string(port, index, self.language_id);
        let mut buffer = match request.to_buffer() {
            Ok(buffer) => buffer,
            Err(e) => {
                debug!("Cannot build string request: {}", e);
                return String::new();
            }
        };

        let written = match self.request(
            hub_path,
            HubIoctl::GetDescriptorFromNodeConnection,
            &mut buffer,
        ) {
            Ok(written) => written,
            Err(e) => {
                debug!(
                    "String {} for port {} on {} failed: {}",
                    index, port, hub_path, e
                );
                return String::new();
            }
        };

        if index == 0 || written <= DescriptorRequest::HEADER_SIZE {
            return String::new();
        }

        decode_string_descriptor(&buffer[DescriptorRequest::HEADER_SIZE..written]).unwrap_or_else(
            |e| {
                debug!("String {} for port {} undecodable: {}", index, port, e);
                String::new()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{
        FakeDevice, FakePlatform, ROOT_HUB_PATH, create_mock_descriptor, create_sample_platform,
    };

    #[test]
    fn test_device_descriptor_from_hub() {
        let platform = create_sample_platform();
        let fetcher = DescriptorFetcher::new(&platform);

        let descriptor = fetcher.get_device_descriptor(ROOT_HUB_PATH, 4);
        assert_eq!(descriptor.vendor_id, 0x0781);
        assert_eq!(descriptor.product_id, 0x5567);
        assert_eq!(descriptor.serial_index, 3);

        let log = platform.log();
        assert_eq!(log.channels_opened, 1);
        assert_eq!(log.channels_closed, 1);
        assert_eq!(log.requests[0].port, 4);
    }

    #[test]
    fn test_unopenable_channel_gives_zero_descriptor() {
        let mut platform = create_sample_platform();
        platform.fail_channel(ROOT_HUB_PATH);
        let fetcher = DescriptorFetcher::new(&platform);

        assert!(fetcher.get_device_descriptor(ROOT_HUB_PATH, 4).is_empty());
        assert!(fetcher.get_device_descriptor(r"\\?\missing", 4).is_empty());
        assert!(platform.log().requests.is_empty());
    }

    #[test]
    fn test_empty_hub_path_never_opens_channel() {
        let platform = create_sample_platform();
        let fetcher = DescriptorFetcher::new(&platform);

        assert!(fetcher.get_device_descriptor("", 4).is_empty());
        assert_eq!(fetcher.get_string_descriptor("", 4, 1), "");
        assert_eq!(platform.log().channels_opened, 0);
    }

    #[test]
    fn test_failed_request_still_closes_channel() {
        let platform = create_sample_platform();
        let fetcher = DescriptorFetcher::new(&platform);

        // nothing on port 7
        assert!(fetcher.get_device_descriptor(ROOT_HUB_PATH, 7).is_empty());
        assert_eq!(fetcher.get_string_descriptor(ROOT_HUB_PATH, 7, 1), "");

        let log = platform.log();
        assert_eq!(log.channels_opened, 2);
        assert_eq!(log.channels_closed, 2);
    }

    #[test]
    fn test_string_descriptor() {
        let platform = create_sample_platform();
        let fetcher = DescriptorFetcher::new(&platform);

        assert_eq!(fetcher.get_string_descriptor(ROOT_HUB_PATH, 4, 2), "Cruzer Blade");
        assert_eq!(
            fetcher.get_string_descriptor(ROOT_HUB_PATH, 4, 3),
            "4C530001230115117341"
        );

        let request = &platform.log().requests[0];
        assert_eq!(request.string_index, Some(2));
        assert_eq!(request.port, 4);
    }

    #[test]
    fn test_missing_string_is_empty() {
        let platform = create_sample_platform();
        let fetcher = DescriptorFetcher::new(&platform);
        assert_eq!(fetcher.get_string_descriptor(ROOT_HUB_PATH, 4, 9), "");
    }

    #[test]
    fn test_zero_index_skips_request() {
        let platform = create_sample_platform();
        let fetcher = DescriptorFetcher::new(&platform);

        assert_eq!(fetcher.get_string_descriptor(ROOT_HUB_PATH, 4, 0), "");
        assert_eq!(platform.log().channels_opened, 0);
    }

    #[test]
    fn test_zero_index_is_empty_even_when_requested() {
        let platform = create_sample_platform();
        let fetcher = DescriptorFetcher::new(&platform).skip_zero_index(false);

        // the fake hub answers index 0 with the language table
        assert_eq!(fetcher.get_string_descriptor(ROOT_HUB_PATH, 4, 0), "");
        assert_eq!(platform.log().requests.len(), 1);
        assert_eq!(platform.log().requests[0].string_index, Some(0));
    }

    #[test]
    fn test_non_ascii_string() {
        let mut platform = FakePlatform::new();
        let hub = platform.add(FakeDevice::hub(ROOT_HUB_PATH));
        platform.add(
            FakeDevice::new("dev", create_mock_descriptor(0x1234, 0x0001, 1, 0, 0))
                .attached(hub, 2)
                .string(1, "Müller Gerätebau ✓"),
        );
        let fetcher = DescriptorFetcher::new(&platform);
        assert_eq!(
            fetcher.get_string_descriptor(ROOT_HUB_PATH, 2, 1),
            "Müller Gerätebau ✓"
        );
    }

    #[test]
    fn test_connection_info_details() {
        let platform = create_sample_platform();
        let fetcher = DescriptorFetcher::new(&platform);
        let info = fetcher.get_connection_info(ROOT_HUB_PATH, 1).unwrap();
        assert_eq!(info.connection_index, 1);
        assert_eq!(info.device_descriptor.vendor_id, 0x046d);
        assert!(!info.device_is_hub);
    }
}
