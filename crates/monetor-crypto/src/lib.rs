//! # monetor-crypto
//!
//! Cryptographic primitives for the moneTor payment substrate.
//!
//! The hash function is fixed (BLAKE3); every derived value uses a
//! registered domain-separation context from [`blake3::contexts`].
//!
//! ## Modules
//!
//! - [`blake3`] - Domain-separated BLAKE3 hashing
//! - [`codec`] - Key to address, descriptor and token digests, address hex framing
//! - [`hash_chain`] - Hash-chain generation, verification and payee tracking
//! - [`commitment`] - Wallet and message commitments

pub mod blake3;
pub mod codec;
pub mod commitment;
pub mod hash_chain;

use monetor_types::LengthError;
use subtle::ConstantTimeEq;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Malformed or mis-sized input buffer.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Malformed commitment parameters or keys.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Hash chains must contain at least one element.
    #[error("invalid hash chain size: {size}")]
    InvalidSize { size: usize },

    /// Output buffer cannot hold the rendered value.
    #[error("buffer too small: need {needed}, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    /// A revealed payment token was not admitted.
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

impl From<LengthError> for CryptoError {
    fn from(err: LengthError) -> Self {
        CryptoError::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Compare two byte strings in constant time with respect to their contents.
///
/// Length is not secret; mismatched lengths compare unequal.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
