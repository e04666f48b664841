//! Hash chains for nanopayment tokens.
//!
//! A chain of length `N` starts from a random head (element 0) and each
//! following element is the BLAKE3 hash of the previous one. The last
//! element is published as the tail. Payment `k` reveals `chain[N-1-k]`,
//! which hashes to the tail in exactly `k` steps, so the payee needs to keep
//! nothing but the tail (or the last accepted token) to check it.
//!
//! ```text
//! head = c[0] -> c[1] -> ... -> c[N-2] -> c[N-1] = tail
//!                              payment 1   committed
//! ```

use monetor_types::payment::NanoPublic;
use monetor_types::{ChainHash, HASH_LEN};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{ct_eq, CryptoError, Result};

/// Apply one step of the chain hash.
pub fn step(link: &ChainHash) -> ChainHash {
    crate::blake3::hash(link)
}

/// A generated hash chain. Secret material is wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct HashChain {
    links: Vec<ChainHash>,
}

impl HashChain {
    /// Generate a chain of `size` elements from `head`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidSize`] if `size` is zero.
    pub fn create(size: usize, head: &ChainHash) -> Result<Self> {
        if size < 1 {
            return Err(CryptoError::InvalidSize { size });
        }
        let mut links = Vec::with_capacity(size);
        links.push(*head);
        for i in 1..size {
            let next = step(&links[i - 1]);
            links.push(next);
        }
        Ok(Self { links })
    }

    /// Generate a chain of `size` elements from a fresh random head.
    pub fn random(size: usize) -> Result<Self> {
        let mut head = [0u8; HASH_LEN];
        rand::rngs::OsRng.fill_bytes(&mut head);
        let chain = Self::create(size, &head);
        head.zeroize();
        chain
    }

    /// Number of elements, tail included.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Always false; a chain holds at least its head.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Number of payments the chain can fund (every element but the tail).
    pub fn capacity(&self) -> usize {
        self.links.len() - 1
    }

    /// The committed tail (last generated element).
    pub fn tail(&self) -> &ChainHash {
        &self.links[self.links.len() - 1]
    }

    /// Element at generation index `i`.
    pub fn get(&self, i: usize) -> Option<&ChainHash> {
        self.links.get(i)
    }

    /// The token that hashes to the tail in exactly `k` steps.
    ///
    /// `token(0)` is the tail itself; `token(k)` for `k >= len()` is `None`.
    pub fn token(&self, k: usize) -> Option<&ChainHash> {
        let idx = self.links.len().checked_sub(1)?.checked_sub(k)?;
        self.links.get(idx)
    }
}

impl std::fmt::Debug for HashChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashChain")
            .field("len", &self.links.len())
            .field("tail", &hex::encode(self.tail()))
            .finish()
    }
}

/// Check that `preimage` reduces to `tail` after exactly `k` hashes.
///
/// The final comparison is constant-time. `k = 0` requires
/// `preimage == tail`.
pub fn verify(tail: &ChainHash, preimage: &ChainHash, k: usize) -> bool {
    let mut current = *preimage;
    for _ in 0..k {
        current = step(&current);
    }
    let ok = ct_eq(&current, tail);
    current.zeroize();
    ok
}

/// [`verify`] over untrusted byte slices.
///
/// # Errors
///
/// [`CryptoError::InvalidInput`] if either input is not exactly
/// [`HASH_LEN`] bytes.
pub fn verify_slices(tail: &[u8], preimage: &[u8], k: usize) -> Result<bool> {
    let tail: ChainHash = tail.try_into().map_err(|_| {
        CryptoError::InvalidInput(format!("tail must be {HASH_LEN} bytes, got {}", tail.len()))
    })?;
    let preimage: ChainHash = preimage.try_into().map_err(|_| {
        CryptoError::InvalidInput(format!(
            "preimage must be {HASH_LEN} bytes, got {}",
            preimage.len()
        ))
    })?;
    Ok(verify(&tail, &preimage, k))
}

/// Payee-side admission state for one nanopayment channel.
///
/// Each accepted token becomes the reference for the next one, so admission
/// costs one hash regardless of how far down the chain the payer is.
#[derive(Clone, Debug)]
pub struct ChainReceiver {
    tail: ChainHash,
    last_hash: ChainHash,
    num_payments: u32,
    max_payments: u32,
}

impl ChainReceiver {
    /// Start tracking a chain with the given committed tail.
    pub fn new(tail: ChainHash, max_payments: u32) -> Self {
        Self {
            tail,
            last_hash: tail,
            num_payments: 0,
            max_payments,
        }
    }

    /// Start tracking the chain published in a nanopayment setup token.
    pub fn from_public(public: &NanoPublic) -> Self {
        Self::new(public.hash_tail, public.num_payments)
    }

    /// Admit the next revealed token.
    ///
    /// Returns the total number of payments accepted so far.
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidToken`] if the chain is exhausted or the token
    /// does not hash to the last accepted value (this also rejects replays).
    pub fn accept(&mut self, token: &ChainHash) -> Result<u32> {
        if self.num_payments >= self.max_payments {
            return Err(CryptoError::InvalidToken(format!(
                "chain exhausted after {} payments",
                self.max_payments
            )));
        }
        if !ct_eq(&step(token), &self.last_hash) {
            return Err(CryptoError::InvalidToken(format!(
                "token does not extend chain at payment {}",
                self.num_payments + 1
            )));
        }
        self.last_hash = *token;
        self.num_payments += 1;
        Ok(self.num_payments)
    }

    /// The committed tail.
    pub fn tail(&self) -> &ChainHash {
        &self.tail
    }

    /// The most recently accepted token (the tail before any payment).
    pub fn last_hash(&self) -> &ChainHash {
        &self.last_hash
    }

    /// Payments accepted so far.
    pub fn num_payments(&self) -> u32 {
        self.num_payments
    }

    /// Payments still available on this chain.
    pub fn remaining(&self) -> u32 {
        self.max_payments - self.num_payments
    }
}
