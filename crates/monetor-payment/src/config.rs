//! Payment configuration.
//!
//! Every field has a default, so an empty file (or no file) yields a working
//! configuration.

use std::path::Path;

use monetor_onion::INTERMEDIARY_LIFETIME_SECS;
use serde::{Deserialize, Serialize};

use crate::{PaymentError, Result};

/// Upper bound on `nan_len`; each funded payment holds one chain element
/// in memory.
pub const MAX_NAN_LEN: u32 = 1_000_000;

/// Payment parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Length of a channel epoch in seconds; the payer rotates its hash
    /// chain at each boundary.
    #[serde(default = "default_epoch_secs")]
    pub epoch_secs: u64,
    /// Intermediaries older than this are evicted.
    #[serde(default = "default_intermediary_lifetime")]
    pub intermediary_lifetime_secs: u64,
    /// Value credited to the payee per nanopayment.
    #[serde(default = "default_nan_val")]
    pub nan_val: u64,
    /// Nanopayments funded per hash chain.
    #[serde(default = "default_nan_len")]
    pub nan_len: u32,
    /// Flat fee charged by the intermediary per channel.
    #[serde(default = "default_fee")]
    pub fee: u64,
    /// Intermediary tax, percent of each payment.
    #[serde(default = "default_tax_percent")]
    pub tax_percent: u64,
    /// Protocol tolerance bound into wallet commitments.
    #[serde(default)]
    pub epsilon: u64,
    /// Treat payment paths as wanted from the first tick.
    #[serde(default = "default_true")]
    pub demand_on_start: bool,
}

// Default value functions

fn default_epoch_secs() -> u64 {
    600
}

fn default_intermediary_lifetime() -> u64 {
    INTERMEDIARY_LIFETIME_SECS
}

fn default_nan_val() -> u64 {
    5
}

fn default_nan_len() -> u32 {
    1000
}

fn default_fee() -> u64 {
    20
}

fn default_tax_percent() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            epoch_secs: default_epoch_secs(),
            intermediary_lifetime_secs: default_intermediary_lifetime(),
            nan_val: default_nan_val(),
            nan_len: default_nan_len(),
            fee: default_fee(),
            tax_percent: default_tax_percent(),
            epsilon: 0,
            demand_on_start: true,
        }
    }
}

impl PaymentConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// [`PaymentError::Config`] on a parse failure or invalid values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PaymentConfig =
            toml::from_str(content).map_err(|e| PaymentError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// [`PaymentError::Config`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| PaymentError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Reject values the scheduler and channels cannot operate with.
    ///
    /// # Errors
    ///
    /// [`PaymentError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.epoch_secs == 0 {
            return Err(PaymentError::Config("epoch_secs must be positive".to_string()));
        }
        if self.intermediary_lifetime_secs == 0 {
            return Err(PaymentError::Config(
                "intermediary_lifetime_secs must be positive".to_string(),
            ));
        }
        if self.nan_len == 0 {
            return Err(PaymentError::Config("nan_len must be positive".to_string()));
        }
        if self.nan_len > MAX_NAN_LEN {
            return Err(PaymentError::Config(format!(
                "nan_len {} exceeds {MAX_NAN_LEN}",
                self.nan_len
            )));
        }
        if self.tax_percent > 100 {
            return Err(PaymentError::Config(format!(
                "tax_percent {} exceeds 100",
                self.tax_percent
            )));
        }
        Ok(())
    }

    /// Per-payment debit including the intermediary tax.
    pub fn val_from(&self) -> Option<u64> {
        let tax = self.nan_val.checked_mul(self.tax_percent)? / 100;
        self.nan_val.checked_add(tax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PaymentConfig::default();
        assert_eq!(config.epoch_secs, 600);
        assert_eq!(config.intermediary_lifetime_secs, 3600);
        assert_eq!(config.nan_len, 1000);
        assert!(config.demand_on_start);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn test_config_serialization() {
        let config = PaymentConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let parsed = PaymentConfig::from_toml_str(&toml_str).expect("parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = PaymentConfig::from_toml_str("nan_val = 7\nepsilon = 2\n").expect("parse");
        assert_eq!(config.nan_val, 7);
        assert_eq!(config.epsilon, 2);
        assert_eq!(config.fee, 20);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            PaymentConfig::from_toml_str("epoch_secs = 0"),
            Err(PaymentError::Config(_))
        ));
        assert!(matches!(
            PaymentConfig::from_toml_str("tax_percent = 101"),
            Err(PaymentError::Config(_))
        ));
        assert!(matches!(
            PaymentConfig::from_toml_str("nan_len = \"many\""),
            Err(PaymentError::Config(_))
        ));
    }

    #[test]
    fn test_nan_len_capped() {
        let at_cap = format!("nan_len = {MAX_NAN_LEN}");
        assert_eq!(
            PaymentConfig::from_toml_str(&at_cap).expect("at cap").nan_len,
            MAX_NAN_LEN
        );

        let err = PaymentConfig::from_toml_str(&format!("nan_len = {}", u32::MAX))
            .expect_err("too long");
        assert!(matches!(err, PaymentError::Config(ref msg) if msg.contains("nan_len")));
    }

    #[test]
    fn test_load_missing_file_defaults() {
        let path = Path::new("/nonexistent/monetor/payment.toml");
        assert_eq!(PaymentConfig::load(path).expect("load"), PaymentConfig::default());
    }

    #[test]
    fn test_val_from_includes_tax() {
        let config = PaymentConfig {
            nan_val: 100,
            tax_percent: 5,
            ..Default::default()
        };
        assert_eq!(config.val_from(), Some(105));
    }
}
