//! Digest and address derivations.
//!
//! Pure functions with no hidden randomness: the same descriptor, token or
//! key always maps to the same digest or address across restarts.

use monetor_types::payment::{Descriptor, NanoPublic};
use monetor_types::{Address, Digest, PublicKey, ADDR_HEX_BUF_LEN, ADDR_LEN};

use crate::blake3::{self, contexts};
use crate::{CryptoError, Result};

/// Prefix framing every rendered address.
pub const HEX_PREFIX: &str = "0x";

/// Parse a public key from an untrusted buffer.
///
/// # Errors
///
/// [`CryptoError::InvalidInput`] unless `bytes` is exactly
/// [`monetor_types::PK_LEN`] long.
pub fn pk_from_slice(bytes: &[u8]) -> Result<PublicKey> {
    Ok(PublicKey::try_from(bytes)?)
}

/// Convert a payment public key into its address.
pub fn pk_to_addr(pk: &PublicKey) -> Address {
    Address(blake3::derive_truncated(contexts::PK_ADDRESS, pk.as_bytes()))
}

/// Convert a payment descriptor into a map-key digest.
pub fn desc_to_digest(desc: &Descriptor) -> Digest {
    let mut input = [0u8; 9];
    input[..8].copy_from_slice(&desc.id.to_le_bytes());
    input[8] = desc.party as u8;
    Digest(blake3::derive_truncated(contexts::DESC_DIGEST, &input))
}

/// Convert a nanopayment public token into a map-key digest.
pub fn nanpub_to_digest(token: &NanoPublic) -> Digest {
    let fields = blake3::encode_multi_field(&[
        &token.val_from.to_le_bytes(),
        &token.val_to.to_le_bytes(),
        &token.num_payments.to_le_bytes(),
        &token.hash_tail,
    ]);
    Digest(blake3::derive_truncated(contexts::NANPUB_DIGEST, &fields))
}

/// Render an address as `0x` followed by lowercase hex.
pub fn addr_to_hex(addr: &Address) -> String {
    format!("{HEX_PREFIX}{}", hex::encode(addr.as_bytes()))
}

/// Write the NUL-terminated framed form of `addr` into `out`.
///
/// Returns the number of characters written, excluding the terminator.
///
/// # Errors
///
/// [`CryptoError::BufferTooSmall`] if `out` is shorter than
/// [`ADDR_HEX_BUF_LEN`].
pub fn addr_to_hex_buf(addr: &Address, out: &mut [u8]) -> Result<usize> {
    if out.len() < ADDR_HEX_BUF_LEN {
        return Err(CryptoError::BufferTooSmall {
            needed: ADDR_HEX_BUF_LEN,
            actual: out.len(),
        });
    }
    let body_end = HEX_PREFIX.len() + ADDR_LEN * 2;
    out[..HEX_PREFIX.len()].copy_from_slice(HEX_PREFIX.as_bytes());
    hex::encode_to_slice(addr.as_bytes(), &mut out[HEX_PREFIX.len()..body_end])
        .map_err(|e| CryptoError::InvalidInput(format!("hex encode: {e}")))?;
    out[body_end] = 0;
    Ok(body_end)
}

/// Parse the framed hex form produced by [`addr_to_hex`].
///
/// A single trailing NUL (as written by [`addr_to_hex_buf`]) is accepted.
pub fn hex_to_addr(s: &str) -> Result<Address> {
    let s = s.strip_suffix('\0').unwrap_or(s);
    let body = s
        .strip_prefix(HEX_PREFIX)
        .ok_or_else(|| CryptoError::InvalidInput(format!("missing {HEX_PREFIX} prefix")))?;
    if body.len() != ADDR_LEN * 2 {
        return Err(CryptoError::InvalidInput(format!(
            "address hex must be {} characters, got {}",
            ADDR_LEN * 2,
            body.len()
        )));
    }
    let mut bytes = [0u8; ADDR_LEN];
    hex::decode_to_slice(body, &mut bytes)
        .map_err(|e| CryptoError::InvalidInput(format!("address hex: {e}")))?;
    Ok(Address(bytes))
}
