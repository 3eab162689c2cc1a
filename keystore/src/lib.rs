//! VRF key management.
//!
//! Secret keys are persisted only in encrypted form (Argon2id key derivation,
//! AES-256-GCM encryption) through a [`KeyBackend`]. A [`VrfKeyStore`] keeps
//! the keys unlocked with the operator's passphrase in memory and produces
//! proofs with them.

pub mod backend;
pub mod encrypted;
pub mod error;
pub mod store;

pub use backend::{FileBackend, KeyBackend, MemoryBackend};
pub use encrypted::{decrypt_key, encrypt_key, EncryptedKey, KdfParams};
pub use error::KeystoreError;
pub use store::{UnlockOutcome, VrfKeyStore};
