//! # monetor-payment
//!
//! Payment-side control plane for moneTor clients and relays.
//!
//! - [`config`] - Payment parameters loaded from TOML
//! - [`facade`] - Send/alert transport trait and a recording implementation
//! - [`funds`] - Fund sufficiency checks
//! - [`payload`] - CBOR payloads for nanopayment messages
//! - [`channel`] - Nanopayment channel state for payer and payee
//! - [`scheduler`] - Once-per-second maintenance tick
//! - [`driver`] - Async loop feeding ticks and circuit events to the scheduler
//!
//! ## Tick Order
//!
//! | Step | Action |
//! |---|---|
//! | 1 | Re-evaluate fund sufficiency |
//! | 2 | Launch circuits to intermediaries when payments are pending |
//! | 3 | Rotate the channel epoch and prune expired intermediaries |

pub mod channel;
pub mod config;
pub mod driver;
pub mod facade;
pub mod funds;
pub mod payload;
pub mod scheduler;

use monetor_crypto::CryptoError;
use monetor_onion::OnionError;

use crate::facade::FacadeError;

/// Error types for payment operations.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// Wallet balance could not be evaluated or is insufficient.
    #[error("funds: {0}")]
    Funds(String),

    /// Every token of the current hash chain has been spent.
    #[error("hash chain exhausted after {spent} payments")]
    ChainExhausted { spent: u32 },

    /// A received payment token was rejected.
    #[error("invalid payment token: {0}")]
    InvalidToken(String),

    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Facade(#[from] FacadeError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Onion(#[from] OnionError),

    /// CBOR encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The scheduler driver task has exited.
    #[error("payment driver stopped")]
    DriverStopped,
}

/// Convenience result type for payment operations.
pub type Result<T> = std::result::Result<T, PaymentError>;
