use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("point is not on the secp256k1 curve")]
    NotOnCurve,

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid compressed point prefix: {0:#04x}")]
    InvalidPrefix(u8),

    #[error("scalar is zero or not below the group order")]
    InvalidScalar,

    #[error("result is the point at infinity")]
    PointAtInfinity,

    #[error("invalid hex: {0}")]
    InvalidHex(String),
}
