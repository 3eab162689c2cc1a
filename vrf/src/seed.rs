//! Request seeds.
//!
//! The coordinator emits a pre-seed with each request. The seed actually
//! proven is the hash of the pre-seed and the hash of the block that
//! included the request, which the requester cannot predict.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use sortes_crypto::keccak256_multi;
use sortes_types::{u256_to_word, BlockHash};
use std::fmt;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seed([u8; 32]);

impl Seed {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_u256(value: &U256) -> Self {
        Self(u256_to_word(value))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed(0x{})", hex::encode(self.0))
    }
}

/// Everything needed to derive the final seed for a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreSeedData {
    pub pre_seed: Seed,
    pub block_hash: BlockHash,
    pub block_num: u64,
}

/// `keccak256(preSeed ‖ blockHash)` as an integer.
pub fn final_seed(s: &PreSeedData) -> U256 {
    U256::from_big_endian(&keccak256_multi(&[
        s.pre_seed.as_bytes(),
        s.block_hash.as_bytes(),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sortes_crypto::keccak256;

    #[test]
    fn final_seed_hashes_concatenation() {
        let s = PreSeedData {
            pre_seed: Seed::new([1; 32]),
            block_hash: BlockHash::new([2; 32]),
            block_num: 10,
        };
        let mut joined = [0u8; 64];
        joined[..32].copy_from_slice(&[1; 32]);
        joined[32..].copy_from_slice(&[2; 32]);
        assert_eq!(final_seed(&s), U256::from_big_endian(&keccak256(&joined)));
    }

    #[test]
    fn final_seed_ignores_block_number() {
        let mut s = PreSeedData {
            pre_seed: Seed::new([1; 32]),
            block_hash: BlockHash::new([2; 32]),
            block_num: 10,
        };
        let a = final_seed(&s);
        s.block_num = 11;
        assert_eq!(a, final_seed(&s));
    }

    #[test]
    fn seed_u256_roundtrip() {
        let v = U256::from(123_456u64);
        assert_eq!(Seed::from_u256(&v).to_u256(), v);
    }
}
