//! Parameters of the OT extension.

use serde::{Deserialize, Serialize};

use super::OtError;

/// Security parameters of the OT extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtConfig {
    /// Number of base OTs, which is also the bit width of every correlated OT. Must be a
    /// positive multiple of 8.
    pub security_parameter: usize,
    /// Number of additional random OTs that are sacrificed by the consistency check.
    pub statistical_security: usize,
}

impl Default for OtConfig {
    fn default() -> Self {
        Self {
            security_parameter: 128,
            statistical_security: 40,
        }
    }
}

impl OtConfig {
    pub(crate) fn validate(&self) -> Result<(), OtError> {
        if self.security_parameter == 0 || self.security_parameter % 8 != 0 {
            return Err(OtError::InvalidParameters(format!(
                "security parameter {} is not a positive multiple of 8",
                self.security_parameter
            )));
        }
        Ok(())
    }

    /// The number of correlated OTs actually extended to get `n` checked ones, rounded up to whole
    /// bytes.
    pub(crate) fn padded(&self, n: usize) -> usize {
        (n + self.security_parameter + self.statistical_security).div_ceil(8) * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let config: OtConfig = serde_json::from_str(r#"{"security_parameter": 8}"#).unwrap();
        assert_eq!(config.security_parameter, 8);
        assert_eq!(config.statistical_security, 40);
        assert!(config.validate().is_ok());
        assert_eq!(config.padded(100), 152);
    }

    #[test]
    fn rejects_unaligned_security_parameter() {
        let config = OtConfig {
            security_parameter: 12,
            ..OtConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
