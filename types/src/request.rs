//! Randomness request identifiers.

use primitive_types::U256;
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Identifier assigned to a randomness request by the coordinator contract.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(U256);

impl RequestId {
    pub fn new(value: U256) -> Self {
        Self(value)
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    pub fn to_word(&self) -> [u8; 32] {
        crate::u256_to_word(&self.0)
    }

    pub fn from_word(word: &[u8; 32]) -> Self {
        Self(U256::from_big_endian(word))
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_dec_str(s)
            .map(Self)
            .map_err(|e| TypesError::InvalidInteger(format!("{e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_roundtrip() {
        let id = RequestId::from(0xdead_beef_u64);
        assert_eq!(RequestId::from_word(&id.to_word()), id);
    }

    #[test]
    fn display_is_decimal() {
        assert_eq!(RequestId::from(1234u64).to_string(), "1234");
        assert_eq!("1234".parse::<RequestId>().unwrap(), RequestId::from(1234u64));
    }

    #[test]
    fn ordering_follows_integer_value() {
        assert!(RequestId::from(2u64) > RequestId::from(1u64));
    }
}
