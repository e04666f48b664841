//! Domain-separated BLAKE3 hashing for the moneTor payment layer.
//!
//! ## Modes
//!
//! - [`hash`] - Pure hashing: hash-chain links
//! - [`derive_key`] - Key derivation: addresses, digests, commitment keys
//! - [`keyed_hash`] - Keyed MAC/PRF: wallet commitments
//!
//! ## Context Strings
//!
//! Every derivation uses one of the registered context strings in
//! [`contexts`]. Unregistered context strings are a protocol violation.

/// Registered BLAKE3 context strings.
pub mod contexts {
    pub const PK_ADDRESS: &str = "moneTor v1 pk-address";
    pub const DESC_DIGEST: &str = "moneTor v1 desc-digest";
    pub const NANPUB_DIGEST: &str = "moneTor v1 nanpub-digest";
    pub const WALLET_COMMIT_KEY: &str = "moneTor v1 wallet-commit-key";
    pub const MESSAGE_COMMIT: &str = "moneTor v1 message-commit";

    /// All registered context strings. Used for validation.
    pub const ALL_CONTEXTS: &[&str] = &[
        PK_ADDRESS,
        DESC_DIGEST,
        NANPUB_DIGEST,
        WALLET_COMMIT_KEY,
        MESSAGE_COMMIT,
    ];
}

/// Compute BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive a key using BLAKE3's built-in key derivation mode.
///
/// # Arguments
///
/// * `context` - A registered context string (must start with "moneTor v1 ")
/// * `key_material` - The input key material
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

/// Derive a key and keep the first `N` bytes.
pub fn derive_truncated<const N: usize>(context: &str, key_material: &[u8]) -> [u8; N] {
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    let mut out = [0u8; N];
    hasher.finalize_xof().fill(&mut out);
    out
}

/// Compute a keyed BLAKE3 hash (MAC/PRF).
pub fn keyed_hash(key: &[u8; 32], message: &[u8]) -> [u8; 32] {
    *::blake3::keyed_hash(key, message).as_bytes()
}

/// Verify that a context string is registered.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

/// Encode multiple dynamic fields using length-prefixed encoding.
///
/// `LE32(len(field1)) || field1 || LE32(len(field2)) || field2 || ...`
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_context_strings_prefixed() {
        for ctx in contexts::ALL_CONTEXTS {
            assert!(
                ctx.starts_with("moneTor v1 "),
                "Context string '{ctx}' has wrong prefix"
            );
        }
    }

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash(b"moneTor"), hash(b"moneTor"));
        assert_ne!(hash(b"input1"), hash(b"input2"));
    }

    #[test]
    fn test_derive_key_different_contexts() {
        let k1 = derive_key(contexts::PK_ADDRESS, &[0u8; 32]);
        let k2 = derive_key(contexts::DESC_DIGEST, &[0u8; 32]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_derive_truncated_is_prefix() {
        let full = derive_key(contexts::PK_ADDRESS, b"key");
        let short: [u8; 20] = derive_truncated(contexts::PK_ADDRESS, b"key");
        assert_eq!(&full[..20], &short);
    }

    #[test]
    fn test_keyed_hash_depends_on_key() {
        let m1 = keyed_hash(&[1u8; 32], b"msg");
        let m2 = keyed_hash(&[2u8; 32], b"msg");
        assert_ne!(m1, m2);
    }

    #[test]
    fn test_multi_field_encoding() {
        let encoded = encode_multi_field(&[b"hello", b"world"]);
        assert_eq!(encoded.len(), 4 + 5 + 4 + 5);
        assert_eq!(&encoded[0..4], &5u32.to_le_bytes());
        assert_eq!(&encoded[4..9], b"hello");
        assert_eq!(&encoded[13..18], b"world");
    }

    #[test]
    fn test_is_registered_context() {
        assert!(is_registered_context("moneTor v1 pk-address"));
        assert!(!is_registered_context("moneTor v1 made-up-context"));
    }
}
