//! Fundamental types for the Sortes randomness oracle.
//!
//! This crate defines the chain-facing types shared across every other crate
//! in the workspace: addresses, hashes, request identifiers, raw event logs,
//! chain heads and timestamps.

pub mod address;
pub mod error;
pub mod hash;
pub mod log;
pub mod request;
pub mod time;

pub use address::Address;
pub use error::TypesError;
pub use hash::{BlockHash, TxHash};
pub use log::{Head, LogKey, RawLog};
pub use primitive_types::{U256, U512};
pub use request::RequestId;
pub use time::{Clock, SystemClock, Timestamp};

/// Encode a 256-bit integer as a 32-byte big-endian word.
pub fn u256_to_word(value: &U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

/// Encode a `u64` as a 32-byte big-endian word, left-padded with zeros.
pub fn u64_to_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Parse a hex string (with or without `0x`) into a fixed-size byte array.
pub fn parse_hex_array<const N: usize>(s: &str) -> Result<[u8; N], TypesError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(TypesError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}
