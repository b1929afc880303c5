//! Report rendering
//!
//! Text is one labeled block per device in enumeration order. JSON is a
//! pretty-printed array of the records.

use anyhow::{Context, Result};
use protocol::DeviceRecord;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;

/// Line printed before every device block
pub const SEPARATOR: &str = "----------------------------------------------------";

/// Report format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "Unknown output format '{}', expected 'text' or 'json'",
                other
            )),
        }
    }
}

/// How records are rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOptions {
    pub format: OutputFormat,
    /// Print vendor and product ids as `0x%04x`
    pub hex_ids: bool,
    /// Add port, hub and connection lines
    pub verbose: bool,
}

fn format_id(id: u16, hex: bool) -> String {
    if hex {
        format!("{:#06x}", id)
    } else {
        id.to_string()
    }
}

/// Format a BCD release number such as `0x0210` as `2.10`
fn format_bcd(bcd: u16) -> String {
    format!("{:x}.{:02x}", bcd >> 8, bcd & 0xff)
}

/// Render the text report; empty input gives an empty string
pub fn render_text(records: &[DeviceRecord], options: &ReportOptions) -> String {
    let mut out = String::new();

    for record in records {
        let descriptor = &record.descriptor;
        // writing to a String cannot fail
        let _ = writeln!(out, "{}", SEPARATOR);
        let _ = writeln!(out, "Device Path = {}", record.device_path);
        let _ = writeln!(
            out,
            "Vendor Id = {}",
            format_id(descriptor.vendor_id, options.hex_ids)
        );
        let _ = writeln!(
            out,
            "Product Id = {}",
            format_id(descriptor.product_id, options.hex_ids)
        );
        let _ = writeln!(out, "Manufacturer = {}", record.manufacturer);
        let _ = writeln!(out, "Serial = {}", record.serial);
        let _ = writeln!(out, "Product = {}", record.product);

        if options.verbose {
            let _ = writeln!(out, "Port = {}", record.port);
            let _ = writeln!(out, "Hub Path = {}", record.hub_path);
            if !descriptor.is_empty() {
                let _ = writeln!(out, "USB Version = {}", format_bcd(descriptor.usb_version));
                let _ = writeln!(out, "Class = {:#04x}", descriptor.class);
            }
            if let Some(connection) = &record.connection {
                let _ = writeln!(out, "Speed = {}", connection.speed);
                let _ = writeln!(out, "Address = {}", connection.device_address);
            }
        }
    }

    out
}

/// Render the records as a pretty JSON array
pub fn render_json(records: &[DeviceRecord]) -> Result<String> {
    serde_json::to_string_pretty(records).context("Failed to serialize device records")
}

/// Render in the format `options` asks for
pub fn render(records: &[DeviceRecord], options: &ReportOptions) -> Result<String> {
    match options.format {
        OutputFormat::Text => Ok(render_text(records, options)),
        OutputFormat::Json => render_json(records),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::create_mock_record;
    use protocol::{ConnectionDetails, ConnectionStatus, DeviceSpeed};

    fn keyboard() -> DeviceRecord {
        let mut record = create_mock_record(r"\\?\usb#vid_046d&pid_c31c", 0x046d, 0xc31c);
        record.manufacturer = "Logitech".to_string();
        record.serial = String::new();
        record.product = "USB Keyboard".to_string();
        record
    }

    #[test]
    fn test_separator_width() {
        assert_eq!(SEPARATOR.len(), 52);
        assert!(SEPARATOR.chars().all(|c| c == '-'));
    }

    #[test]
    fn test_empty_input_renders_nothing() {
        assert_eq!(render_text(&[], &ReportOptions::default()), "");
    }

    #[test]
    fn test_text_block() {
        let text = render_text(&[keyboard()], &ReportOptions::default());
        let expected = format!(
            "{}\nDevice Path = \\\\?\\usb#vid_046d&pid_c31c\nVendor Id = 1133\nProduct Id = 49948\n\
             Manufacturer = Logitech\nSerial = \nProduct = USB Keyboard\n",
            SEPARATOR
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_blocks_keep_order() {
        let first = create_mock_record("first", 1, 1);
        let second = create_mock_record("second", 2, 2);
        let text = render_text(&[first, second], &ReportOptions::default());

        assert_eq!(text.matches(SEPARATOR).count(), 2);
        let first_at = text.find("Device Path = first").unwrap();
        let second_at = text.find("Device Path = second").unwrap();
        assert!(first_at < second_at);
    }

    #[test]
    fn test_hex_ids() {
        let options = ReportOptions {
            hex_ids: true,
            ..ReportOptions::default()
        };
        let text = render_text(&[keyboard()], &options);
        assert!(text.contains("Vendor Id = 0x046d\n"));
        assert!(text.contains("Product Id = 0xc31c\n"));
    }

    #[test]
    fn test_verbose_lines() {
        let mut record = keyboard();
        record.port = 3;
        record.connection = Some(ConnectionDetails {
            speed: DeviceSpeed::Full,
            device_address: 7,
            device_is_hub: false,
            status: ConnectionStatus::DeviceConnected,
            open_pipes: 1,
            current_configuration: 1,
        });
        let options = ReportOptions {
            verbose: true,
            ..ReportOptions::default()
        };

        let text = render_text(&[record], &options);
        assert!(text.contains("Port = 3\n"));
        assert!(text.contains("USB Version = 2.00\n"));
        assert!(text.contains("Class = 0x00\n"));
        assert!(text.contains(&format!("Speed = {}\n", DeviceSpeed::Full)));
        assert!(text.contains("Address = 7\n"));
    }

    #[test]
    fn test_verbose_without_connection() {
        let mut record = keyboard();
        record.descriptor = Default::default();
        let options = ReportOptions {
            verbose: true,
            ..ReportOptions::default()
        };

        let text = render_text(&[record], &options);
        assert!(text.contains("Hub Path = "));
        assert!(!text.contains("USB Version"));
        assert!(!text.contains("Speed"));
    }

    #[test]
    fn test_bcd_format() {
        assert_eq!(format_bcd(0x0200), "2.00");
        assert_eq!(format_bcd(0x0110), "1.10");
        assert_eq!(format_bcd(0x0320), "3.20");
    }

    #[test]
    fn test_json_empty_array() {
        assert_eq!(render_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_json_records() {
        let options = ReportOptions {
            format: OutputFormat::Json,
            ..ReportOptions::default()
        };
        let json = render(&[keyboard()], &options).unwrap();
        let parsed: Vec<DeviceRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].manufacturer, "Logitech");
        assert_eq!(parsed[0].descriptor.vendor_id, 0x046d);
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
