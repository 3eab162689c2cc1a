//! The on-chain verifier's view of a proof.
//!
//! The contract cannot afford scalar multiplications or modular inversion,
//! so the prover supplies witnesses it can check cheaply: the address of
//! `c·pk + s·G`, the points `c·gamma` and `s·hash`, and the inverse of the
//! projective denominator of their sum.

use primitive_types::U256;
use sortes_crypto::field::{add_mod, inv_mod, mul_mod, sub_mod};
use sortes_crypto::{Point, FIELD_SIZE};
use sortes_types::{u256_to_word, Address};

use crate::hash_to_curve::{hash_to_curve, scalar_from_curve_points};
use crate::proof::{check_distinct, gamma_output};
use crate::{Proof, VrfError};

/// Length of the fixed-layout encoding.
pub const PROOF_LENGTH: usize = 416;

pub type MarshaledProof = [u8; PROOF_LENGTH];

// Byte offsets of each field in the encoding.
const PK: usize = 0;
const GAMMA: usize = 64;
const C: usize = 128;
const S: usize = 160;
const SEED: usize = 192;
const U_WITNESS: usize = 236;
const C_GAMMA_WITNESS: usize = 256;
const S_HASH_WITNESS: usize = 320;
const Z_INV: usize = 384;

/// A proof together with the witnesses the on-chain verifier requires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolidityProof {
    pub proof: Proof,
    pub u_witness: Address,
    pub c_gamma_witness: Point,
    pub s_hash_witness: Point,
    pub z_inv: U256,
}

const P: U256 = FIELD_SIZE;

fn proj_sub(x1: U256, z1: U256, x2: U256, z2: U256) -> (U256, U256) {
    let num1 = mul_mod(z2, x1, P);
    let num2 = mul_mod(sub_mod(U256::zero(), x2, P), z1, P);
    (add_mod(num1, num2, P), mul_mod(z1, z2, P))
}

fn proj_mul(x1: U256, z1: U256, x2: U256, z2: U256) -> (U256, U256) {
    (mul_mod(x1, x2, P), mul_mod(z1, z2, P))
}

/// Sum of two distinct points in projective coordinates `(x, y, z)`, using
/// the exact sequence of operations the verifier contract performs, so the
/// `z` computed here is the one the contract expects `z_inv` to invert.
pub fn projective_ec_add(p: &Point, q: &Point) -> (U256, U256, U256) {
    let (px, py, qx, qy) = (p.x(), p.y(), q.x(), q.y());
    let one = U256::one();

    let lx = sub_mod(qy, py, P);
    let lz = sub_mod(qx, px, P);

    let (sx, dx) = proj_mul(lx, lz, lx, lz);
    let (sx, dx) = proj_sub(sx, dx, px, one);
    let (sx, dx) = proj_sub(sx, dx, qx, one);

    let (sy, dy) = proj_sub(px, one, sx, dx);
    let (sy, dy) = proj_mul(sy, dy, lx, lz);
    let (sy, dy) = proj_sub(sy, dy, py, one);

    if dx != dy {
        (mul_mod(sx, dy, P), mul_mod(sy, dx, P), mul_mod(dx, dy, P))
    } else {
        (sx, sy, dx)
    }
}

/// Compute the verifier witnesses for a proof.
pub fn solidity_precalculations(proof: &Proof) -> Result<SolidityProof, VrfError> {
    proof.well_formed()?;
    let u = proof
        .public_key
        .mul_add_generator(&proof.c, &proof.s)
        .ok_or_else(|| VrfError::MalformedProof("c·pk + s·G is the point at infinity".into()))?;
    let hash = hash_to_curve(&proof.public_key, &proof.seed);
    let c_gamma = proof
        .gamma
        .mul(&proof.c)
        .ok_or_else(|| VrfError::MalformedProof("c·gamma is the point at infinity".into()))?;
    let s_hash = hash
        .mul(&proof.s)
        .ok_or_else(|| VrfError::MalformedProof("s·hash is the point at infinity".into()))?;
    check_distinct(&c_gamma, &s_hash)?;

    let (_, _, z) = projective_ec_add(&c_gamma, &s_hash);
    if z.is_zero() {
        return Err(VrfError::CGammaEqualsSHash);
    }
    Ok(SolidityProof {
        proof: proof.clone(),
        u_witness: u.ethereum_address(),
        c_gamma_witness: c_gamma,
        s_hash_witness: s_hash,
        z_inv: inv_mod(z, P),
    })
}

impl SolidityProof {
    /// The 416-byte layout the verifier contract decodes:
    ///
    /// ```text
    /// pk 64 | gamma 64 | c 32 | s 32 | seed 32 | pad 12 | uWitness 20 |
    /// cGammaWitness 64 | sHashWitness 64 | zInv 32
    /// ```
    ///
    /// This is also the ABI encoding of the coordinator's static proof struct.
    pub fn marshal_for_solidity_verifier(&self) -> MarshaledProof {
        let mut out = [0u8; PROOF_LENGTH];
        out[PK..GAMMA].copy_from_slice(&self.proof.public_key.long_marshal());
        out[GAMMA..C].copy_from_slice(&self.proof.gamma.long_marshal());
        out[C..S].copy_from_slice(&u256_to_word(&self.proof.c));
        out[S..SEED].copy_from_slice(&u256_to_word(&self.proof.s));
        out[SEED..SEED + 32].copy_from_slice(&u256_to_word(&self.proof.seed));
        out[U_WITNESS..C_GAMMA_WITNESS].copy_from_slice(self.u_witness.as_bytes());
        out[C_GAMMA_WITNESS..S_HASH_WITNESS].copy_from_slice(&self.c_gamma_witness.long_marshal());
        out[S_HASH_WITNESS..Z_INV].copy_from_slice(&self.s_hash_witness.long_marshal());
        out[Z_INV..].copy_from_slice(&u256_to_word(&self.z_inv));
        out
    }
}

fn check_length(bytes: &[u8]) -> Result<(), VrfError> {
    if bytes.len() != PROOF_LENGTH {
        return Err(VrfError::InvalidLength {
            expected: PROOF_LENGTH,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn parse_point(bytes: &[u8], what: &str) -> Result<Point, VrfError> {
    Point::long_unmarshal(bytes).map_err(|e| VrfError::MalformedProof(format!("{what}: {e}")))
}

fn parse_word(bytes: &[u8]) -> U256 {
    U256::from_big_endian(bytes)
}

/// Recover the proof from its 416-byte encoding. The witnesses are ignored
/// and the output is recomputed from gamma.
pub fn unmarshal_solidity_proof(bytes: &[u8]) -> Result<Proof, VrfError> {
    check_length(bytes)?;
    let public_key = parse_point(&bytes[PK..GAMMA], "public key")?;
    let gamma = parse_point(&bytes[GAMMA..C], "gamma")?;
    Ok(Proof {
        public_key,
        gamma,
        c: parse_word(&bytes[C..S]),
        s: parse_word(&bytes[S..SEED]),
        seed: parse_word(&bytes[SEED..SEED + 32]),
        output: gamma_output(&gamma),
    })
}

/// Run the verifier contract's checks on an encoded proof, including every
/// witness, and return the VRF output on success.
pub fn verify_solidity_proof(bytes: &[u8]) -> Result<U256, VrfError> {
    let proof = unmarshal_solidity_proof(bytes)?;
    proof.well_formed()?;
    let mut witness = [0u8; 20];
    witness.copy_from_slice(&bytes[U_WITNESS..C_GAMMA_WITNESS]);
    let u_witness = Address::new(witness);
    let c_gamma_witness = parse_point(&bytes[C_GAMMA_WITNESS..S_HASH_WITNESS], "cGammaWitness")?;
    let s_hash_witness = parse_point(&bytes[S_HASH_WITNESS..Z_INV], "sHashWitness")?;
    let z_inv = parse_word(&bytes[Z_INV..]);

    if u_witness.is_zero() {
        return Err(VrfError::MalformedProof("bad witness".into()));
    }
    let u = proof.public_key.mul_add_generator(&proof.c, &proof.s);
    if u.map(|u| u.ethereum_address()) != Some(u_witness) {
        return Err(VrfError::MalformedProof("addr(c*pk+s*g)!=_uWitness".into()));
    }

    let hash = hash_to_curve(&proof.public_key, &proof.seed);
    check_distinct(&c_gamma_witness, &s_hash_witness)?;
    if proof.gamma.mul(&proof.c) != Some(c_gamma_witness) {
        return Err(VrfError::MalformedProof("First mul check failed".into()));
    }
    if hash.mul(&proof.s) != Some(s_hash_witness) {
        return Err(VrfError::MalformedProof("Second mul check failed".into()));
    }

    let (x, y, z) = projective_ec_add(&c_gamma_witness, &s_hash_witness);
    if mul_mod(z, z_inv, P) != U256::one() {
        return Err(VrfError::MalformedProof("invZ must be inverse of z".into()));
    }
    let v = Point::new(mul_mod(x, z_inv, P), mul_mod(y, z_inv, P))?;

    let derived_c =
        scalar_from_curve_points(&hash, &proof.public_key, &proof.gamma, &u_witness, &v);
    if derived_c != proof.c {
        return Err(VrfError::MalformedProof("invalid proof".into()));
    }
    Ok(proof.output)
}
