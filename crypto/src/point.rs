//! Affine secp256k1 points.
//!
//! A [`Point`] is always a finite point on the curve: every constructor
//! validates, and operations whose result may be the point at infinity
//! return `Option`. Scalar multiplication is delegated to `libsecp256k1`;
//! point addition is done directly in affine coordinates.

use libsecp256k1::curve::{Affine, Field, Jacobian, Scalar};
use libsecp256k1::{ECMULT_CONTEXT, ECMULT_GEN_CONTEXT};
use primitive_types::U256;
use sortes_types::{u256_to_word, Address};
use std::fmt;

use crate::field::{add_mod, inv_mod, mul_mod, sqrt_field, sub_mod, FIELD_SIZE, GROUP_ORDER};
use crate::{keccak256, CryptoError};

const GENERATOR_X: U256 = U256([
    0x59F2_815B_16F8_1798,
    0x029B_FCDB_2DCE_28D9,
    0x55A0_6295_CE87_0B07,
    0x79BE_667E_F9DC_BBAC,
]);

const GENERATOR_Y: U256 = U256([
    0x9C47_D08F_FB10_D4B8,
    0xFD17_B448_A685_5419,
    0x5DA4_FBFC_0E11_08A8,
    0x483A_DA77_26A3_C465,
]);

/// Length of the uncompressed `x ‖ y` encoding.
pub const LONG_MARSHAL_LENGTH: usize = 64;
/// Length of the SEC1 compressed encoding.
pub const COMPRESSED_LENGTH: usize = 33;

/// An affine secp256k1 point. The point at infinity is not representable;
/// operations that could produce it return `None`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    x: U256,
    y: U256,
}

impl Point {
    /// The point `(x, y)`, rejected unless it lies on the curve.
    pub fn new(x: U256, y: U256) -> Result<Self, CryptoError> {
        if !Self::is_on_curve(&x, &y) {
            return Err(CryptoError::NotOnCurve);
        }
        Ok(Self { x, y })
    }

    /// The standard generator `G`.
    pub fn generator() -> Self {
        Self {
            x: GENERATOR_X,
            y: GENERATOR_Y,
        }
    }

    /// Affine abscissa.
    pub fn x(&self) -> U256 {
        self.x
    }

    /// Affine ordinate.
    pub fn y(&self) -> U256 {
        self.y
    }

    /// `x³ + 7 mod p`
    pub fn y_squared(x: &U256) -> U256 {
        let x_cubed = mul_mod(mul_mod(*x, *x, FIELD_SIZE), *x, FIELD_SIZE);
        add_mod(x_cubed, U256::from(7u64), FIELD_SIZE)
    }

    /// Whether `(x, y)` are reduced field elements satisfying the curve
    /// equation.
    pub fn is_on_curve(x: &U256, y: &U256) -> bool {
        *x < FIELD_SIZE && *y < FIELD_SIZE && mul_mod(*y, *y, FIELD_SIZE) == Self::y_squared(x)
    }

    /// The curve point with abscissa `x` and an even ordinate, if `x` is on
    /// the curve.
    pub fn from_x_even(x: U256) -> Option<Self> {
        if x >= FIELD_SIZE {
            return None;
        }
        let mut y = sqrt_field(Self::y_squared(&x))?;
        if y.bit(0) {
            y = FIELD_SIZE - y;
        }
        Self::new(x, y).ok()
    }

    /// `x ‖ y`, each as a 32-byte big-endian word. This is the layout the
    /// on-chain verifier hashes.
    pub fn long_marshal(&self) -> [u8; LONG_MARSHAL_LENGTH] {
        let mut out = [0u8; LONG_MARSHAL_LENGTH];
        out[..32].copy_from_slice(&u256_to_word(&self.x));
        out[32..].copy_from_slice(&u256_to_word(&self.y));
        out
    }

    /// Inverse of [`long_marshal`](Self::long_marshal).
    pub fn long_unmarshal(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != LONG_MARSHAL_LENGTH {
            return Err(CryptoError::InvalidLength {
                expected: LONG_MARSHAL_LENGTH,
                actual: bytes.len(),
            });
        }
        Self::new(
            U256::from_big_endian(&bytes[..32]),
            U256::from_big_endian(&bytes[32..]),
        )
    }

    /// SEC1 compressed encoding: `0x02`/`0x03` by ordinate parity, then `x`.
    pub fn compress(&self) -> [u8; COMPRESSED_LENGTH] {
        let mut out = [0u8; COMPRESSED_LENGTH];
        out[0] = if self.y.bit(0) { 0x03 } else { 0x02 };
        out[1..].copy_from_slice(&u256_to_word(&self.x));
        out
    }

    /// Inverse of [`compress`](Self::compress).
    pub fn decompress(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != COMPRESSED_LENGTH {
            return Err(CryptoError::InvalidLength {
                expected: COMPRESSED_LENGTH,
                actual: bytes.len(),
            });
        }
        let want_odd = match bytes[0] {
            0x02 => false,
            0x03 => true,
            other => return Err(CryptoError::InvalidPrefix(other)),
        };
        let even = Self::from_x_even(U256::from_big_endian(&bytes[1..]))
            .ok_or(CryptoError::NotOnCurve)?;
        Ok(if want_odd { even.neg() } else { even })
    }

    /// The last 20 bytes of the Keccak-256 hash of the uncompressed encoding.
    pub fn ethereum_address(&self) -> Address {
        let digest = keccak256(&self.long_marshal());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        Address::new(bytes)
    }

    /// `-self`, the reflection across the x axis.
    pub fn neg(&self) -> Self {
        Self {
            x: self.x,
            y: sub_mod(U256::zero(), self.y, FIELD_SIZE),
        }
    }

    /// Affine point addition, `None` when the sum is the point at infinity.
    pub fn add(&self, other: &Point) -> Option<Point> {
        let slope = if self.x == other.x {
            if self.y != other.y || self.y.is_zero() {
                return None;
            }
            let three_x_sq = mul_mod(U256::from(3u64), mul_mod(self.x, self.x, FIELD_SIZE), FIELD_SIZE);
            let two_y = add_mod(self.y, self.y, FIELD_SIZE);
            mul_mod(three_x_sq, inv_mod(two_y, FIELD_SIZE), FIELD_SIZE)
        } else {
            let dy = sub_mod(other.y, self.y, FIELD_SIZE);
            let dx = sub_mod(other.x, self.x, FIELD_SIZE);
            mul_mod(dy, inv_mod(dx, FIELD_SIZE), FIELD_SIZE)
        };
        let x = sub_mod(
            sub_mod(mul_mod(slope, slope, FIELD_SIZE), self.x, FIELD_SIZE),
            other.x,
            FIELD_SIZE,
        );
        let y = sub_mod(
            mul_mod(slope, sub_mod(self.x, x, FIELD_SIZE), FIELD_SIZE),
            self.y,
            FIELD_SIZE,
        );
        Some(Self { x, y })
    }

    /// `scalar · self`, with the scalar reduced modulo the group order.
    pub fn mul(&self, scalar: &U256) -> Option<Point> {
        let scalar = to_scalar(scalar)?;
        let mut result = Jacobian::default();
        ECMULT_CONTEXT.ecmult_const(&mut result, &self.to_affine(), &scalar);
        Self::from_jacobian(&result)
    }

    /// `scalar · G`, with the scalar reduced modulo the group order.
    pub fn mul_generator(scalar: &U256) -> Option<Point> {
        let scalar = to_scalar(scalar)?;
        let mut result = Jacobian::default();
        ECMULT_GEN_CONTEXT.ecmult_gen(&mut result, &scalar);
        Self::from_jacobian(&result)
    }

    /// `a · self + g · G` in a single multi-scalar multiplication.
    pub fn mul_add_generator(&self, a: &U256, g: &U256) -> Option<Point> {
        let a = to_scalar(a).unwrap_or_default();
        let g = to_scalar(g).unwrap_or_default();
        let mut base = Jacobian::default();
        base.set_ge(&self.to_affine());
        let mut result = Jacobian::default();
        ECMULT_CONTEXT.ecmult(&mut result, &base, &a, &g);
        Self::from_jacobian(&result)
    }

    fn to_affine(&self) -> Affine {
        let mut x = Field::default();
        let mut y = Field::default();
        let _ = x.set_b32(&u256_to_word(&self.x));
        let _ = y.set_b32(&u256_to_word(&self.y));
        let mut affine = Affine::default();
        affine.set_xy(&x, &y);
        affine
    }

    fn from_jacobian(jacobian: &Jacobian) -> Option<Point> {
        if jacobian.is_infinity() {
            return None;
        }
        let mut affine = Affine::default();
        affine.set_gej(jacobian);
        affine.x.normalize();
        affine.y.normalize();
        Some(Self {
            x: U256::from_big_endian(&affine.x.b32()),
            y: U256::from_big_endian(&affine.y.b32()),
        })
    }
}

/// Reduce modulo the group order; `None` for the zero scalar.
fn to_scalar(value: &U256) -> Option<Scalar> {
    let reduced = *value % GROUP_ORDER;
    if reduced.is_zero() {
        return None;
    }
    let mut scalar = Scalar::default();
    let _overflow: bool = scalar.set_b32(&u256_to_word(&reduced)).into();
    Some(scalar)
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Point(0x{}, 0x{})",
            hex::encode(u256_to_word(&self.x)),
            hex::encode(u256_to_word(&self.y))
        )
    }
}
