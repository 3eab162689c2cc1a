use sortes_crypto::PublicKey;
use sortes_vrf::VrfError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("key {0} is not unlocked")]
    KeyNotUnlocked(PublicKey),

    #[error("invalid key: the zero public key")]
    InvalidKey,

    #[error("key {0} not found")]
    KeyNotFound(PublicKey),

    #[error("key {0} already exists")]
    AlreadyExists(PublicKey),

    #[error("decryption failed: wrong password or corrupted data")]
    Decrypt,

    #[error("failed to unlock {} key(s)", .0.len())]
    Unlock(Vec<KeystoreError>),

    #[error("key encryption error: {0}")]
    Encryption(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Vrf(#[from] VrfError),

    #[error("serialization error: {0}")]
    Serialization(String),
}
