//! Modular arithmetic over 256-bit integers.
//!
//! The on-chain verifier works with plain `uint256` values reduced modulo
//! either the secp256k1 base field size or its group order, so proof
//! construction mirrors that arithmetic exactly rather than going through
//! the curve library's internal representations.

use primitive_types::{U256, U512};

/// The secp256k1 base field size `p`.
pub const FIELD_SIZE: U256 = U256([
    0xFFFF_FFFE_FFFF_FC2F,
    0xFFFF_FFFF_FFFF_FFFF,
    0xFFFF_FFFF_FFFF_FFFF,
    0xFFFF_FFFF_FFFF_FFFF,
]);

/// The order `n` of the secp256k1 generator.
pub const GROUP_ORDER: U256 = U256([
    0xBFD2_5E8C_D036_4141,
    0xBAAE_DCE6_AF48_A03B,
    0xFFFF_FFFF_FFFF_FFFE,
    0xFFFF_FFFF_FFFF_FFFF,
]);

fn low_u256(value: U512) -> U256 {
    let mut buf = [0u8; 64];
    value.to_big_endian(&mut buf);
    U256::from_big_endian(&buf[32..])
}

/// `(a + b) mod m`. Inputs need not be reduced; the 256-bit carry is
/// handled, so this is exact for any `m`.
pub fn add_mod(a: U256, b: U256, m: U256) -> U256 {
    let (a, b) = (a % m, b % m);
    let (sum, overflow) = a.overflowing_add(b);
    if overflow || sum >= m {
        sum.overflowing_sub(m).0
    } else {
        sum
    }
}

/// `(a - b) mod m`, always in `[0, m)`.
pub fn sub_mod(a: U256, b: U256, m: U256) -> U256 {
    let (a, b) = (a % m, b % m);
    if a >= b {
        a - b
    } else {
        m - (b - a)
    }
}

/// `(a · b) mod m` through a 512-bit intermediate product.
pub fn mul_mod(a: U256, b: U256, m: U256) -> U256 {
    low_u256(a.full_mul(b) % U512::from(m))
}

/// `base^exp mod m` by left-to-right square-and-multiply.
pub fn pow_mod(base: U256, exp: U256, m: U256) -> U256 {
    let base = base % m;
    let mut result = U256::one() % m;
    for i in (0..exp.bits()).rev() {
        result = mul_mod(result, result, m);
        if exp.bit(i) {
            result = mul_mod(result, base, m);
        }
    }
    result
}

/// Multiplicative inverse by Fermat's little theorem. `m` must be prime and
/// `a` nonzero modulo `m`; zero maps to zero.
pub fn inv_mod(a: U256, m: U256) -> U256 {
    pow_mod(a, m - U256::from(2u64), m)
}

/// A square root of `a` modulo the base field size, if one exists.
///
/// `p ≡ 3 (mod 4)`, so the candidate is `a^((p+1)/4)`.
pub fn sqrt_field(a: U256) -> Option<U256> {
    let exp = (FIELD_SIZE + U256::one()) >> 2;
    let root = pow_mod(a, exp, FIELD_SIZE);
    (mul_mod(root, root, FIELD_SIZE) == a % FIELD_SIZE).then_some(root)
}
