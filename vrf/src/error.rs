use sortes_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VrfError {
    #[error("secret key or seed is not a valid scalar")]
    BadKeyOrSeed,

    #[error("malformed proof: {0}")]
    MalformedProof(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("c·gamma and s·hash are not distinct points")]
    CGammaEqualsSHash,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
