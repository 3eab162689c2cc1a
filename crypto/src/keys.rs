//! VRF key types.
//!
//! Secret keys are scalars in `[1, n)` and are zeroized on drop. Public keys
//! are identified by their SEC1 compressed encoding; the on-chain key hash is
//! the Keccak-256 of the uncompressed encoding.

use primitive_types::U256;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sortes_types::u256_to_word;
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::point::COMPRESSED_LENGTH;
use crate::{keccak256, CryptoError, Point, GROUP_ORDER};

/// A VRF secret key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    /// Generate a new secret key from the OS random source.
    pub fn random() -> Self {
        Self(u256_to_word(&random_scalar()))
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        Self::from_u256(U256::from_big_endian(bytes))
    }

    /// Rejects zero and anything at or above the group order.
    pub fn from_u256(value: U256) -> Result<Self, CryptoError> {
        if value.is_zero() || value >= GROUP_ORDER {
            return Err(CryptoError::InvalidScalar);
        }
        Ok(Self(u256_to_word(&value)))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// `sk · G`.
    pub fn public_point(&self) -> Point {
        match Point::mul_generator(&self.to_u256()) {
            Some(point) => point,
            None => unreachable!("secret key is a nonzero scalar below the group order"),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_point(&self.public_point())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(..)")
    }
}

/// A uniformly random scalar in `[1, n)`.
pub fn random_scalar() -> U256 {
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; 32];
    loop {
        rng.fill_bytes(&mut bytes);
        let candidate = U256::from_big_endian(&bytes);
        if !candidate.is_zero() && candidate < GROUP_ORDER {
            bytes.zeroize();
            return candidate;
        }
    }
}

/// A VRF public key in SEC1 compressed form.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; COMPRESSED_LENGTH]);

impl PublicKey {
    /// The all-zero key, which never corresponds to a secret key.
    pub const ZERO: Self = Self([0u8; COMPRESSED_LENGTH]);

    pub fn from_point(point: &Point) -> Self {
        Self(point.compress())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let point = Point::decompress(bytes)?;
        Ok(Self::from_point(&point))
    }

    pub fn as_bytes(&self) -> &[u8; COMPRESSED_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; COMPRESSED_LENGTH]
    }

    /// Decompress to the curve point.
    pub fn point(&self) -> Result<Point, CryptoError> {
        Point::decompress(&self.0)
    }

    /// The key hash the coordinator contract uses to address this key:
    /// Keccak-256 of the 64-byte uncompressed encoding.
    pub fn hash(&self) -> Result<[u8; 32], CryptoError> {
        Ok(keccak256(&self.point()?.long_marshal()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}\u{2026})", hex::encode(&self.0[..5]))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_and_order() {
        assert_eq!(
            SecretKey::from_u256(U256::zero()).unwrap_err(),
            CryptoError::InvalidScalar
        );
        assert_eq!(
            SecretKey::from_u256(GROUP_ORDER).unwrap_err(),
            CryptoError::InvalidScalar
        );
    }

    #[test]
    fn key_one_is_generator() {
        let sk = SecretKey::from_u256(U256::one()).unwrap();
        assert_eq!(sk.public_point(), Point::generator());
    }

    #[test]
    fn random_keys_differ() {
        let a = SecretKey::random();
        let b = SecretKey::random();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn public_key_string_roundtrip() {
        let pk = SecretKey::random().public_key();
        assert_eq!(pk.to_string().parse::<PublicKey>().unwrap(), pk);
    }

    #[test]
    fn public_key_serde_roundtrip() {
        let pk = SecretKey::random().public_key();
        let json = serde_json::to_string(&pk).unwrap();
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);
    }

    #[test]
    fn zero_key_has_no_point() {
        assert!(PublicKey::ZERO.is_zero());
        assert!(PublicKey::ZERO.point().is_err());
    }

    #[test]
    fn key_hash_is_keccak_of_long_encoding() {
        let sk = SecretKey::from_u256(U256::from(7u64)).unwrap();
        let pk = sk.public_key();
        assert_eq!(pk.hash().unwrap(), keccak256(&sk.public_point().long_marshal()));
    }

    #[test]
    fn debug_hides_secret() {
        let sk = SecretKey::from_u256(U256::from(7u64)).unwrap();
        assert_eq!(format!("{:?}", sk), "SecretKey(..)");
    }
}
