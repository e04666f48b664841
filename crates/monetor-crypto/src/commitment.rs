//! Wallet and message commitments.
//!
//! The wallet commitment binds a channel's terminal secret to the public
//! parameters and the payer's key:
//!
//! ```text
//! K   = BLAKE3::derive_key("moneTor v1 wallet-commit-key", pp || pk)
//! com = BLAKE3::keyed_hash(K, enc(wallet_key, balance, hash_tail, nonce, epsilon))
//! ```
//!
//! `enc` is the length-prefixed multi-field encoding. Binding follows from
//! collision resistance; hiding comes from the secret's random `nonce`.
//! Identical inputs always produce the identical commitment.

use monetor_types::{ChainHash, Commitment, PublicKey, PublicParams, HASH_LEN, PK_LEN, PP_LEN};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::blake3::{self, contexts};
use crate::{ct_eq, CryptoError, Result};

/// Terminal secret of one end of a payment channel.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChannelSecret {
    /// Wallet signing secret for this channel.
    pub wallet_key: [u8; 32],
    /// Terminal balance committed to.
    pub balance: u64,
    /// Tail of the hash chain funding the channel.
    pub hash_tail: ChainHash,
    /// Blinding nonce.
    pub nonce: [u8; 32],
}

impl ChannelSecret {
    /// Build a secret with a fresh random blinding nonce.
    pub fn new(wallet_key: [u8; 32], balance: u64, hash_tail: ChainHash) -> Self {
        let mut nonce = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        Self::with_nonce(wallet_key, balance, hash_tail, nonce)
    }

    /// Build a secret with an explicit blinding nonce.
    pub fn with_nonce(
        wallet_key: [u8; 32],
        balance: u64,
        hash_tail: ChainHash,
        nonce: [u8; 32],
    ) -> Self {
        Self {
            wallet_key,
            balance,
            hash_tail,
            nonce,
        }
    }
}

impl std::fmt::Debug for ChannelSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSecret")
            .field("balance", &self.balance)
            .finish_non_exhaustive()
    }
}

/// Parse commitment public parameters from an untrusted buffer.
///
/// # Errors
///
/// [`CryptoError::InvalidParams`] on a length other than [`PP_LEN`].
pub fn params_from_slice(bytes: &[u8]) -> Result<PublicParams> {
    PublicParams::try_from(bytes).map_err(|e| CryptoError::InvalidParams(e.to_string()))
}

/// Parse a payer key for commitment use from an untrusted buffer.
///
/// # Errors
///
/// [`CryptoError::InvalidParams`] on a length other than [`PK_LEN`].
pub fn commit_key_from_slice(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::try_from(bytes).map_err(|e| CryptoError::InvalidParams(e.to_string()))
}

/// Generate random public parameters.
pub fn generate_params() -> PublicParams {
    let mut pp = [0u8; PP_LEN];
    loop {
        rand::rngs::OsRng.fill_bytes(&mut pp);
        if pp != [0u8; PP_LEN] {
            return PublicParams(pp);
        }
    }
}

fn wallet_commit_key(params: &PublicParams, pk: &PublicKey) -> Result<[u8; 32]> {
    if params.0 == [0u8; PP_LEN] {
        return Err(CryptoError::InvalidParams(
            "public parameters are all zero".to_string(),
        ));
    }
    if pk.0 == [0u8; PK_LEN] {
        return Err(CryptoError::InvalidParams("payer key is all zero".to_string()));
    }
    let mut material = [0u8; PP_LEN + PK_LEN];
    material[..PP_LEN].copy_from_slice(params.as_bytes());
    material[PP_LEN..].copy_from_slice(pk.as_bytes());
    Ok(blake3::derive_key(contexts::WALLET_COMMIT_KEY, &material))
}

/// Commit to a channel's terminal secret.
///
/// `epsilon` is the protocol-level tolerance agreed by both channel ends;
/// it is bound into the commitment and otherwise opaque here.
///
/// # Errors
///
/// [`CryptoError::InvalidParams`] if the parameters or key are degenerate.
pub fn commit_wallet(
    params: &PublicParams,
    pk: &PublicKey,
    secret: &ChannelSecret,
    epsilon: u64,
) -> Result<Commitment> {
    let mut key = wallet_commit_key(params, pk)?;
    let mut encoded = blake3::encode_multi_field(&[
        &secret.wallet_key,
        &secret.balance.to_le_bytes(),
        &secret.hash_tail,
        &secret.nonce,
        &epsilon.to_le_bytes(),
    ]);
    let com = blake3::keyed_hash(&key, &encoded);
    key.zeroize();
    encoded.zeroize();
    Ok(Commitment(com))
}

/// Check that `commitment` opens to `secret` under the given inputs.
pub fn verify_wallet_commitment(
    params: &PublicParams,
    pk: &PublicKey,
    secret: &ChannelSecret,
    epsilon: u64,
    commitment: &Commitment,
) -> Result<bool> {
    let expected = commit_wallet(params, pk, secret, epsilon)?;
    Ok(ct_eq(expected.as_bytes(), commitment.as_bytes()))
}

/// Commit to an arbitrary message with caller-supplied randomness.
pub fn commit(msg: &[u8], rand: &[u8; HASH_LEN]) -> Commitment {
    let fields = blake3::encode_multi_field(&[msg, rand]);
    Commitment(blake3::derive_key(contexts::MESSAGE_COMMIT, &fields))
}

/// Check a message commitment produced by [`commit`].
pub fn decommit(msg: &[u8], rand: &[u8; HASH_LEN], com: &Commitment) -> bool {
    ct_eq(commit(msg, rand).as_bytes(), com.as_bytes())
}
