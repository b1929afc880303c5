//! Port extraction from location text
//!
//! Hosts describe a device's bus position with text such as
//! `Port_#0004.Hub_#0002`. The port is the number between the first `#` and
//! the first `.`; anything before the `#` or after the `.` is ignored.

use thiserror::Error;

/// Location text that does not carry a usable port number
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location '{0}' has no '#' port marker")]
    MissingPortMarker(String),

    #[error("location '{0}' has no '.' after the port number")]
    MissingTerminator(String),

    #[error("location '{0}' has '.' before the '#' port marker")]
    TerminatorBeforeMarker(String),

    #[error("location '{0}' has an empty port number")]
    EmptyPort(String),

    #[error("location '{location}' has an invalid port number '{port}'")]
    InvalidPort { location: String, port: String },
}

/// Extract the hub port number from location text
///
/// # Example
/// ```
/// use reader::location::parse_port;
///
/// assert_eq!(parse_port("Port_#0004.Hub_#0002").unwrap(), 4);
/// assert!(parse_port("0000.0014.0120.016").is_err());
/// ```
pub fn parse_port(location: &str) -> Result<u32, LocationError> {
    let marker = location
        .find('#')
        .ok_or_else(|| LocationError::MissingPortMarker(location.to_string()))?;
    let terminator = location
        .find('.')
        .ok_or_else(|| LocationError::MissingTerminator(location.to_string()))?;

    if terminator <= marker {
        return Err(LocationError::TerminatorBeforeMarker(location.to_string()));
    }

    let digits = &location[marker + 1..terminator];
    if digits.is_empty() {
        return Err(LocationError::EmptyPort(location.to_string()));
    }

    digits.parse::<u32>().map_err(|_| LocationError::InvalidPort {
        location: location.to_string(),
        port: digits.to_string(),
    })
}
