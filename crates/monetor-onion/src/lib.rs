//! # monetor-onion
//!
//! Intermediary relays for moneTor payment traffic.
//!
//! Payment messages travel over dedicated circuits whose last hop is an
//! intermediary relay. This crate owns the set of intermediaries, their
//! reachability, and the circuit-build retry budget:
//!
//! - [`circuit`] - Extend info, the circuit-launch collaborator, completion events
//! - [`intermediary`] - Registry with the `No`/`Maybe`/`Yes` state machine
//! - [`relay`] - Weighted selection of intermediary candidates from a relay cache
//!
//! ## Key Parameters
//!
//! | Parameter | Value |
//! |---|---|
//! | Circuit build retries per intermediary | 3 |
//! | Intermediary lifetime | 1 hour |

pub mod circuit;
pub mod intermediary;
pub mod relay;

/// Circuit build attempts allowed before an intermediary is marked unreachable.
pub const INTERMEDIARY_MAX_RETRIES: u32 = 3;

/// Default lifetime of a selected intermediary in seconds (1 hour).
pub const INTERMEDIARY_LIFETIME_SECS: u64 = 3600;

/// Error types for intermediary operations.
#[derive(Debug, thiserror::Error)]
pub enum OnionError {
    /// The transport could not build the intermediary leg.
    #[error("circuit build failed: {0}")]
    CircuitBuildFailed(String),

    /// No registry entry for the given address.
    #[error("unknown intermediary {0}")]
    UnknownIntermediary(String),

    /// The intermediary exhausted its retry budget.
    #[error("intermediary {addr} unreachable after {retries} retries")]
    Unreachable { addr: String, retries: u32 },

    /// A circuit build to this intermediary is already outstanding.
    #[error("launch already in flight for {0}")]
    LaunchInFlight(String),

    /// Not enough relays to choose an intermediary from.
    #[error("insufficient relays: need {need}, have {have}")]
    InsufficientRelays { need: usize, have: usize },
}

/// Convenience result type for intermediary operations.
pub type Result<T> = std::result::Result<T, OnionError>;
