//! Fund sufficiency.
//!
//! A payer can keep paying if its open channel still covers one more
//! nanopayment, or if its main account can fund a fresh channel:
//!
//! ```text
//! chn_balance >= val_from
//!   or
//! mac_balance >= val_from * nan_len + fee
//! ```
//!
//! where `val_from = nan_val + nan_val * tax_percent / 100`.

use tracing::debug;

use crate::config::PaymentConfig;
use crate::{PaymentError, Result};

/// Source of the fund-sufficiency signal evaluated on every tick.
pub trait FundsSource {
    /// Whether the next payment can be funded.
    ///
    /// # Errors
    ///
    /// Any failure to evaluate balances; the scheduler logs it and treats
    /// funds as insufficient for that tick.
    fn has_enough_funds(&mut self) -> Result<bool>;
}

impl<F: FundsSource + ?Sized> FundsSource for Box<F> {
    fn has_enough_funds(&mut self) -> Result<bool> {
        (**self).has_enough_funds()
    }
}

/// Local view of a payer's balances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletFunds {
    /// Main account balance.
    mac_balance: u64,
    /// Balance escrowed in open channels.
    chn_balance: u64,
    nan_val: u64,
    nan_len: u32,
    fee: u64,
    tax_percent: u64,
}

impl WalletFunds {
    pub fn new(mac_balance: u64, config: &PaymentConfig) -> Self {
        Self {
            mac_balance,
            chn_balance: 0,
            nan_val: config.nan_val,
            nan_len: config.nan_len,
            fee: config.fee,
            tax_percent: config.tax_percent,
        }
    }

    pub fn mac_balance(&self) -> u64 {
        self.mac_balance
    }

    pub fn chn_balance(&self) -> u64 {
        self.chn_balance
    }

    /// Debit per nanopayment, tax included.
    pub fn val_from(&self) -> Result<u64> {
        self.nan_val
            .checked_mul(self.tax_percent)
            .map(|tax| tax / 100)
            .and_then(|tax| self.nan_val.checked_add(tax))
            .ok_or_else(|| PaymentError::Funds("per-payment value overflows".to_string()))
    }

    /// Cost of escrowing a fresh channel, fee included.
    pub fn channel_cost(&self) -> Result<u64> {
        self.val_from()?
            .checked_mul(u64::from(self.nan_len))
            .and_then(|v| v.checked_add(self.fee))
            .ok_or_else(|| PaymentError::Funds("channel cost overflows".to_string()))
    }

    /// Move a channel's worth of value from the main account into escrow.
    ///
    /// # Errors
    ///
    /// [`PaymentError::Funds`] if the main account cannot cover it.
    pub fn open_channel(&mut self) -> Result<u64> {
        let cost = self.channel_cost()?;
        let escrow = cost - self.fee;
        self.mac_balance = self.mac_balance.checked_sub(cost).ok_or_else(|| {
            PaymentError::Funds(format!(
                "channel costs {cost}, main account holds {}",
                self.mac_balance
            ))
        })?;
        self.chn_balance = self.chn_balance.saturating_add(escrow);
        debug!(cost, escrow, mac_balance = self.mac_balance, "Escrowed channel funds");
        Ok(escrow)
    }

    /// Debit one nanopayment from escrow.
    ///
    /// # Errors
    ///
    /// [`PaymentError::Funds`] if the escrow is short.
    pub fn spend(&mut self) -> Result<()> {
        let val_from = self.val_from()?;
        self.chn_balance = self.chn_balance.checked_sub(val_from).ok_or_else(|| {
            PaymentError::Funds(format!(
                "payment costs {val_from}, escrow holds {}",
                self.chn_balance
            ))
        })?;
        Ok(())
    }

    /// Return unspent escrow to the main account.
    pub fn close_channels(&mut self) {
        self.mac_balance = self.mac_balance.saturating_add(self.chn_balance);
        self.chn_balance = 0;
    }
}

impl FundsSource for WalletFunds {
    fn has_enough_funds(&mut self) -> Result<bool> {
        let val_from = self.val_from()?;
        if self.chn_balance >= val_from {
            return Ok(true);
        }
        Ok(self.mac_balance >= self.channel_cost()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PaymentConfig {
        PaymentConfig {
            nan_val: 100,
            nan_len: 10,
            fee: 50,
            tax_percent: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_channel_cost() {
        let funds = WalletFunds::new(0, &config());
        assert_eq!(funds.val_from().expect("val"), 105);
        assert_eq!(funds.channel_cost().expect("cost"), 1_100);
    }

    #[test]
    fn test_enough_funds_threshold() {
        let mut funds = WalletFunds::new(1_099, &config());
        assert!(!funds.has_enough_funds().expect("check"));
        let mut funds = WalletFunds::new(1_100, &config());
        assert!(funds.has_enough_funds().expect("check"));
    }

    #[test]
    fn test_open_spend_close() {
        let mut funds = WalletFunds::new(1_200, &config());
        assert_eq!(funds.open_channel().expect("open"), 1_050);
        assert_eq!(funds.mac_balance(), 100);
        assert!(funds.has_enough_funds().expect("escrow covers a payment"));

        for _ in 0..10 {
            funds.spend().expect("spend");
        }
        assert_eq!(funds.chn_balance(), 0);
        assert!(!funds.has_enough_funds().expect("check"));
        assert!(matches!(funds.spend(), Err(PaymentError::Funds(_))));

        funds.close_channels();
        assert_eq!(funds.mac_balance(), 100);
    }

    #[test]
    fn test_open_channel_insufficient() {
        let mut funds = WalletFunds::new(10, &config());
        assert!(matches!(funds.open_channel(), Err(PaymentError::Funds(_))));
        assert_eq!(funds.mac_balance(), 10);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let cfg = PaymentConfig {
            nan_val: u64::MAX,
            tax_percent: 5,
            ..Default::default()
        };
        let mut funds = WalletFunds::new(0, &cfg);
        assert!(matches!(
            funds.has_enough_funds(),
            Err(PaymentError::Funds(_))
        ));
    }
}
