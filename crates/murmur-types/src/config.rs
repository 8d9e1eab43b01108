//! Runtime configuration with sensible defaults.
//!
//! All operational timing parameters of the overlay are centralized
//! here. Every value has a documented default; protocol constants
//! (frame codes, flag bits) are not configuration and live with the
//! wire format.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{MurmurError, Result};

/// Default envelope lifetime applied when a caller passes a zero TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(50);

/// Default proof-of-work sealing budget applied when a caller passes a
/// zero budget.
pub const DEFAULT_WORK: Duration = Duration::from_millis(50);

/// Default pool sweep period.
pub const DEFAULT_EXPIRATION_CYCLE: Duration = Duration::from_millis(800);

/// Default peer broadcast period.
pub const DEFAULT_TRANSMISSION_CYCLE: Duration = Duration::from_millis(300);

// ---------------------------------------------------------------------------
// MurmurConfig
// ---------------------------------------------------------------------------

/// Node-level configuration.
///
/// All values are configurable at construction time; [`Default`]
/// matches the recommended deployment values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MurmurConfig {
    /// Envelope lifetime used when a message is wrapped without an
    /// explicit TTL.
    pub default_ttl: Duration,

    /// Proof-of-work budget used when a message is wrapped without an
    /// explicit sealing budget.
    pub default_work: Duration,

    /// Period of the pool expiration sweep.
    pub expiration_cycle: Duration,

    /// Period of the per-peer broadcast cycle.
    pub transmission_cycle: Duration,
}

impl Default for MurmurConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            default_work: DEFAULT_WORK,
            expiration_cycle: DEFAULT_EXPIRATION_CYCLE,
            transmission_cycle: DEFAULT_TRANSMISSION_CYCLE,
        }
    }
}

impl MurmurConfig {
    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl < Duration::from_secs(1) {
            // Expiry is carried in whole seconds; anything below one
            // second truncates to an envelope that is already stale.
            return Err(MurmurError::ConfigError {
                reason: "default_ttl must be at least one second".into(),
            });
        }

        if self.expiration_cycle.is_zero() {
            return Err(MurmurError::ConfigError {
                reason: "expiration_cycle must be greater than zero".into(),
            });
        }

        if self.transmission_cycle.is_zero() {
            return Err(MurmurError::ConfigError {
                reason: "transmission_cycle must be greater than zero".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MurmurConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_values() {
        let config = MurmurConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(50));
        assert_eq!(config.default_work, Duration::from_millis(50));
        assert_eq!(config.expiration_cycle, Duration::from_millis(800));
        assert_eq!(config.transmission_cycle, Duration::from_millis(300));
    }

    #[test]
    fn subsecond_ttl_rejected() {
        let config = MurmurConfig {
            default_ttl: Duration::from_millis(500),
            ..MurmurConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_expiration_cycle_rejected() {
        let config = MurmurConfig {
            expiration_cycle: Duration::ZERO,
            ..MurmurConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_transmission_cycle_rejected() {
        let config = MurmurConfig {
            transmission_cycle: Duration::ZERO,
            ..MurmurConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_serde_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config = MurmurConfig::default();
        let json = serde_json::to_string(&config)?;
        let parsed: MurmurConfig = serde_json::from_str(&json)?;
        assert_eq!(config.default_ttl, parsed.default_ttl);
        assert_eq!(config.expiration_cycle, parsed.expiration_cycle);
        assert_eq!(config.transmission_cycle, parsed.transmission_cycle);
        Ok(())
    }
}
