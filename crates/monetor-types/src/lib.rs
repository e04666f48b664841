//! # monetor-types
//!
//! Shared value types for the moneTor payment substrate.
//!
//! Every buffer that crosses a wire or commitment boundary is a fixed-size
//! newtype. Construction from untrusted byte slices goes through `TryFrom`,
//! which rejects any length other than the exact one.
//!
//! ## Modules
//!
//! - [`payment`] - Payment descriptors, path positions, message types and
//!   nanopayment public state

pub mod payment;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// Length of a payment public key in bytes.
pub const PK_LEN: usize = 32;

/// Length of a payment address in bytes.
pub const ADDR_LEN: usize = 20;

/// Length of a map-key digest in bytes.
pub const DIGEST_LEN: usize = 20;

/// Length of a hash-chain element in bytes.
pub const HASH_LEN: usize = 32;

/// Length of the commitment public parameters in bytes.
pub const PP_LEN: usize = 32;

/// Length of a wallet commitment in bytes.
pub const COM_LEN: usize = 32;

/// Size of the framed hex buffer for an address: `0x`, hex body, NUL.
pub const ADDR_HEX_BUF_LEN: usize = ADDR_LEN * 2 + 3;

/// Maximum nickname length in characters.
pub const MAX_NICKNAME_LEN: usize = 40;

/// One element of a hash chain.
pub type ChainHash = [u8; HASH_LEN];

/// A byte slice had the wrong length for a fixed-size type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid length for {kind}: expected {expected}, got {actual}")]
pub struct LengthError {
    /// Name of the type being constructed.
    pub kind: &'static str,
    /// Required length.
    pub expected: usize,
    /// Length that was supplied.
    pub actual: usize,
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[serde_as]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(#[serde_as(as = "serde_with::hex::Hex")] pub [u8; $len]);

        impl $name {
            /// Length of the underlying buffer.
            pub const LEN: usize = $len;

            /// Borrow the raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = LengthError;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| LengthError {
                    kind: stringify!($name),
                    expected: $len,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

fixed_bytes!(
    /// Payment public key (opaque key material).
    PublicKey,
    PK_LEN
);

fixed_bytes!(
    /// Payment address derived from a [`PublicKey`].
    Address,
    ADDR_LEN
);

fixed_bytes!(
    /// Fixed-length digest used as a map key.
    Digest,
    DIGEST_LEN
);

fixed_bytes!(
    /// Public parameters of the commitment scheme.
    PublicParams,
    PP_LEN
);

fixed_bytes!(
    /// A binding commitment to a channel's terminal secret.
    Commitment,
    COM_LEN
);
