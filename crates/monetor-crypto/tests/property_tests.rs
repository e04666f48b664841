//! Property-based tests for hash chains and the address codec.

use monetor_crypto::codec::{addr_to_hex, hex_to_addr};
use monetor_crypto::hash_chain::{verify, HashChain};
use monetor_types::{Address, ADDR_LEN};
use proptest::prelude::*;

proptest! {
    #[test]
    fn chain_tokens_verify_only_at_their_index(
        seed in prop::array::uniform32(any::<u8>()),
        n in 1usize..24,
    ) {
        let chain = HashChain::create(n, &seed).expect("create");
        let tail = *chain.tail();
        for k in 0..n {
            let pre = *chain.get(n - 1 - k).expect("element");
            prop_assert!(verify(&tail, &pre, k));
            for other in 0..n {
                if other != k {
                    prop_assert!(!verify(&tail, &pre, other));
                }
            }
        }
    }

    #[test]
    fn chain_rejects_single_bit_flip(
        seed in prop::array::uniform32(any::<u8>()),
        n in 2usize..16,
        k_pick in any::<usize>(),
        bit in 0usize..256,
    ) {
        let chain = HashChain::create(n, &seed).expect("create");
        let k = k_pick % n;
        let mut pre = *chain.token(k).expect("token");
        pre[bit / 8] ^= 1 << (bit % 8);
        prop_assert!(!verify(chain.tail(), &pre, k));
    }

    #[test]
    fn verify_deterministic(
        tail in prop::array::uniform32(any::<u8>()),
        pre in prop::array::uniform32(any::<u8>()),
        k in 0usize..8,
    ) {
        prop_assert_eq!(verify(&tail, &pre, k), verify(&tail, &pre, k));
    }

    #[test]
    fn address_hex_roundtrip(bytes in prop::collection::vec(any::<u8>(), ADDR_LEN)) {
        let addr = Address::try_from(bytes.as_slice()).expect("exact length");
        let rendered = addr_to_hex(&addr);
        prop_assert_eq!(hex_to_addr(&rendered).expect("decode"), addr);
    }
}
