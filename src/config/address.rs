//! Peripheral (battery management unit) BLE address.

use super::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Length of the textual address form `AA:BB:CC:DD:EE:FF`.
pub const ADDRESS_LEN: usize = 17;

/// A well-formed BLE device address.
///
/// Stored in canonical upper-case form. Construction is the only place the
/// format is checked, so holding a `PeripheralAddress` means a connect attempt
/// may be armed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralAddress(String);

impl PeripheralAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PeripheralAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != ADDRESS_LEN {
            return Err(ConfigError::InvalidAddress(format!(
                "expected {} characters, got {}",
                ADDRESS_LEN,
                s.len()
            )));
        }

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6
            || parts
                .iter()
                .any(|p| p.len() != 2 || !p.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(ConfigError::InvalidAddress(format!(
                "'{}' is not of the form AA:BB:CC:DD:EE:FF",
                s
            )));
        }

        Ok(Self(s.to_ascii_uppercase()))
    }
}

impl fmt::Display for PeripheralAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_address() {
        let addr: PeripheralAddress = "c8:47:80:3f:67:7c".parse().unwrap();
        assert_eq!(addr.as_str(), "C8:47:80:3F:67:7C");
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(matches!(
            "C8:47:80:3F:67".parse::<PeripheralAddress>(),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(matches!(
            "".parse::<PeripheralAddress>(),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_bad_separator_or_digits_rejected() {
        assert!("C8-47-80-3F-67-7C".parse::<PeripheralAddress>().is_err());
        assert!("C8:47:80:3F:67:ZZ".parse::<PeripheralAddress>().is_err());
        assert!("C8:478:0:3F:67:7C".parse::<PeripheralAddress>().is_err());
    }
}
