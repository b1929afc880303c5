//! usb-descriptor-reader
//!
//! Lists the USB devices attached to this host with their vendor and product
//! ids and their manufacturer, serial number and product strings, read through
//! the hub each device is attached to.

use anyhow::{Context, Result};
use clap::Parser;
use common::{InterfaceClass, setup_logging};
use reader::config::ReaderConfig;
use reader::platform::open_platform;
use reader::report::{OutputFormat, render};
use reader::usb::DeviceEnumerator;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "usb-descriptor-reader")]
#[command(
    author,
    version,
    about = "Read USB device descriptors and strings through their hubs"
)]
#[command(long_about = "
Enumerates present USB devices, finds the hub and port each one is attached
to, and asks the hub for the device descriptor and the manufacturer, serial
number and product strings.

EXAMPLES:
    # Plain text report
    usb-descriptor-reader

    # JSON with connection details
    usb-descriptor-reader --format json --verbose

    # Report hubs instead of devices, ids in hex
    usb-descriptor-reader --interface hub --hex

    # Debug logging to stderr
    usb-descriptor-reader --log-level debug

CONFIGURATION:
    Settings are read from the path given with --config, otherwise from
    ~/.config/usb-descriptor-reader/reader.toml, otherwise built-in defaults.
    Command line flags override the file.
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Report format (text, json)
    #[arg(short, long, value_name = "FORMAT")]
    format: Option<OutputFormat>,

    /// Print vendor and product ids in hex
    #[arg(long)]
    hex: bool,

    /// Include port, hub and connection details
    #[arg(short, long)]
    verbose: bool,

    /// Interface class to enumerate (device, hub)
    #[arg(short, long, value_name = "CLASS")]
    interface: Option<InterfaceClass>,
}

impl Args {
    fn apply(&self, config: &mut ReaderConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if self.hex {
            config.output.hex_ids = true;
        }
        if self.verbose {
            config.output.verbose = true;
        }
        if let Some(interface) = self.interface {
            config.enumeration.interface = interface;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ReaderConfig::default();
        let path = ReaderConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        reader::load_config(path).context("Failed to load configuration")?
    } else {
        ReaderConfig::load_or_default()
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.logging.level).context("Failed to setup logging")?;

    info!("usb-descriptor-reader v{}", env!("CARGO_PKG_VERSION"));
    debug!("Configuration: {:?}", config);

    let platform = open_platform().context("Failed to open USB platform")?;
    let records = match DeviceEnumerator::new(&platform, config.enumeration_options()).enumerate()
    {
        Ok(records) => records,
        Err(e) => {
            error!("Enumeration failed: {}", e);
            return Err(e).context("No devices could be enumerated");
        }
    };

    let report = render(&records, &config.report_options())?;
    if config.output.format == OutputFormat::Json {
        println!("{}", report);
    } else {
        print!("{}", report);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments() {
        let args = Args::try_parse_from(["usb-descriptor-reader"]).unwrap();
        let mut config = ReaderConfig::default();
        args.apply(&mut config);
        assert_eq!(config, ReaderConfig::default());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "usb-descriptor-reader",
            "--format",
            "json",
            "--hex",
            "--verbose",
            "--interface",
            "hub",
            "--log-level",
            "debug",
        ])
        .unwrap();

        let mut config = ReaderConfig::default();
        args.apply(&mut config);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.hex_ids);
        assert!(config.output.verbose);
        assert_eq!(config.enumeration.interface, InterfaceClass::Hub);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_rejects_unknown_values() {
        assert!(Args::try_parse_from(["usb-descriptor-reader", "--format", "xml"]).is_err());
        assert!(Args::try_parse_from(["usb-descriptor-reader", "--interface", "printer"]).is_err());
    }
}
