//! Cryptographic primitives for the Sortes randomness oracle.
//!
//! - **secp256k1** affine points, scalar multiplication and the compressed
//!   and 64-byte uncompressed encodings the on-chain verifier uses
//! - **Keccak-256** hashing and Ethereum address derivation
//! - Modular arithmetic over the curve's base field and group order
//! - VRF secret and public key types

pub mod error;
pub mod field;
pub mod hash;
pub mod keys;
pub mod point;

pub use error::CryptoError;
pub use field::{FIELD_SIZE, GROUP_ORDER};
pub use hash::{keccak256, keccak256_multi};
pub use keys::{random_scalar, PublicKey, SecretKey};
pub use point::Point;
pub use primitive_types::U256;
