//! Hashing into the secp256k1 group and the challenge hash.

use primitive_types::U256;
use sortes_crypto::{keccak256, Point, FIELD_SIZE};
use sortes_types::{u256_to_word, u64_to_word, Address};

/// Domain separator for [`hash_to_curve`], as a 32-byte word.
pub const HASH_TO_CURVE_HASH_PREFIX: u64 = 1;
/// Domain separator for [`scalar_from_curve_points`], as a 32-byte word.
pub const SCALAR_FROM_CURVE_POINTS_HASH_PREFIX: u64 = 2;
/// Rehash attempts before giving up. Each attempt fails with probability
/// about one half, so reaching the bound indicates a broken hash.
pub const MAX_HASH_TO_CURVE_ATTEMPTS: usize = 256;

/// Keccak-256 of `msg`, rehashed until the digest is below the field size.
pub fn field_hash(msg: &[u8]) -> U256 {
    let mut x = U256::from_big_endian(&keccak256(msg));
    while x >= FIELD_SIZE {
        x = U256::from_big_endian(&keccak256(&u256_to_word(&x)));
    }
    x
}

/// Map `(public_key, input)` to a curve point with an even ordinate.
///
/// # Panics
/// Panics if no candidate lands on the curve within
/// [`MAX_HASH_TO_CURVE_ATTEMPTS`] rehashes.
pub fn hash_to_curve(public_key: &Point, input: &U256) -> Point {
    let mut msg = Vec::with_capacity(32 + 64 + 32);
    msg.extend_from_slice(&u64_to_word(HASH_TO_CURVE_HASH_PREFIX));
    msg.extend_from_slice(&public_key.long_marshal());
    msg.extend_from_slice(&u256_to_word(input));

    let mut x = field_hash(&msg);
    for _ in 0..MAX_HASH_TO_CURVE_ATTEMPTS {
        if let Some(point) = Point::from_x_even(x) {
            return point;
        }
        x = field_hash(&u256_to_word(&x));
    }
    panic!("hash_to_curve: no curve point after {MAX_HASH_TO_CURVE_ATTEMPTS} attempts");
}

/// The Fiat-Shamir challenge over the proof transcript. The result is the
/// raw 256-bit digest; callers reject values at or above the group order.
pub fn scalar_from_curve_points(
    hash: &Point,
    public_key: &Point,
    gamma: &Point,
    u_witness: &Address,
    v: &Point,
) -> U256 {
    let mut msg = Vec::with_capacity(32 + 4 * 64 + 20);
    msg.extend_from_slice(&u64_to_word(SCALAR_FROM_CURVE_POINTS_HASH_PREFIX));
    msg.extend_from_slice(&hash.long_marshal());
    msg.extend_from_slice(&public_key.long_marshal());
    msg.extend_from_slice(&gamma.long_marshal());
    msg.extend_from_slice(&v.long_marshal());
    msg.extend_from_slice(u_witness.as_bytes());
    U256::from_big_endian(&keccak256(&msg))
}
