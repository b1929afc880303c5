//! Reader configuration management

use crate::report::{OutputFormat, ReportOptions};
use crate::usb::EnumerationOptions;
use anyhow::{Context, Result, anyhow};
use common::InterfaceClass;
use protocol::LANGUAGE_US_ENGLISH;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub enumeration: EnumerationSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` takes precedence
    #[serde(default = "LoggingSettings::default_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

impl LoggingSettings {
    fn default_level() -> String {
        "warn".to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Report format (text, json)
    #[serde(default)]
    pub format: OutputFormat,
    /// Print vendor and product ids in hex
    #[serde(default)]
    pub hex_ids: bool,
    /// Include port, hub and connection details
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationSettings {
    /// Interface class to enumerate (device, hub)
    #[serde(default = "EnumerationSettings::default_interface")]
    pub interface: InterfaceClass,
    /// Language id for string descriptor requests
    #[serde(default = "EnumerationSettings::default_language_id")]
    pub language_id: u16,
    /// Skip the request for string index 0
    #[serde(default = "EnumerationSettings::default_true")]
    pub skip_zero_string_index: bool,
    /// Resolve each hub's path once per pass
    #[serde(default = "EnumerationSettings::default_true")]
    pub cache_hub_paths: bool,
}

impl Default for EnumerationSettings {
    fn default() -> Self {
        Self {
            interface: Self::default_interface(),
            language_id: Self::default_language_id(),
            skip_zero_string_index: true,
            cache_hub_paths: true,
        }
    }
}

impl EnumerationSettings {
    fn default_interface() -> InterfaceClass {
        InterfaceClass::Device
    }

    fn default_language_id() -> u16 {
        LANGUAGE_US_ENGLISH
    }

    fn default_true() -> bool {
        true
    }
}

impl ReaderConfig {
    /// Load configuration from `path`, or from the default location
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => {
                let p = Self::default_path();
                if !p.exists() {
                    return Err(anyhow!("No configuration file at {}", p.display()));
                }
                p
            }
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ReaderConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::debug!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-descriptor-reader").join("reader.toml")
        } else {
            PathBuf::from(".config/usb-descriptor-reader/reader.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.logging.level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        if self.enumeration.language_id == 0 {
            return Err(anyhow!(
                "Invalid language_id 0, use a LANGID such as 1033 (US English)"
            ));
        }

        Ok(())
    }

    pub fn enumeration_options(&self) -> EnumerationOptions {
        EnumerationOptions {
            interface: self.enumeration.interface,
            language_id: self.enumeration.language_id,
            skip_zero_string_index: self.enumeration.skip_zero_string_index,
            cache_hub_paths: self.enumeration.cache_hub_paths,
        }
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            format: self.output.format,
            hex_ids: self.output.hex_ids,
            verbose: self.output.verbose,
        }
    }
}

/// Load a config file, expanding a leading `~`
pub fn load_config(path: &str) -> Result<ReaderConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    ReaderConfig::load(Some(path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReaderConfig::default();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(!config.output.hex_ids);
        assert_eq!(config.enumeration.interface, InterfaceClass::Device);
        assert_eq!(config.enumeration.language_id, 1033);
        assert!(config.enumeration.skip_zero_string_index);
        assert!(config.enumeration.cache_hub_paths);
    }

    #[test]
    fn test_config_serialization() {
        let config = ReaderConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ReaderConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: ReaderConfig = toml::from_str(
            r#"
            [output]
            format = "json"

            [enumeration]
            interface = "hub"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.output.format, OutputFormat::Json);
        assert_eq!(parsed.enumeration.interface, InterfaceClass::Hub);
        assert_eq!(parsed.enumeration.language_id, 1033);
        assert!(parsed.enumeration.cache_hub_paths);
        assert_eq!(parsed.logging.level, "warn");
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let parsed: std::result::Result<ReaderConfig, _> = toml::from_str(
            r#"
            [output]
            format = "xml"
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = ReaderConfig::default();
        assert!(config.validate().is_ok());

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_language_id() {
        let mut config = ReaderConfig::default();
        config.enumeration.language_id = 0;
        assert!(config.validate().is_err());

        config.enumeration.language_id = 0x0407;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_options_follow_settings() {
        let mut config = ReaderConfig::default();
        config.output.hex_ids = true;
        config.enumeration.cache_hub_paths = false;

        assert!(config.report_options().hex_ids);
        let options = config.enumeration_options();
        assert!(!options.cache_hub_paths);
        assert_eq!(options.language_id, 1033);
    }

    #[test]
    fn test_default_path_file_name() {
        let path = ReaderConfig::default_path();
        assert!(path.ends_with("usb-descriptor-reader/reader.toml"));
    }
}
