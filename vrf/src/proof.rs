//! VRF proof generation and off-chain verification.

use primitive_types::U256;
use sortes_crypto::field::{mul_mod, sub_mod};
use sortes_crypto::{keccak256, random_scalar, Point, SecretKey, GROUP_ORDER};

use crate::hash_to_curve::{hash_to_curve, scalar_from_curve_points};
use crate::VrfError;

/// A VRF proof that `output` is the VRF value of `seed` under `public_key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
    pub public_key: Point,
    pub gamma: Point,
    pub c: U256,
    pub s: U256,
    pub seed: U256,
    pub output: U256,
}

/// The VRF output for a given gamma: Keccak-256 of its uncompressed encoding.
pub(crate) fn gamma_output(gamma: &Point) -> U256 {
    U256::from_big_endian(&keccak256(&gamma.long_marshal()))
}

/// Reject `c·gamma` and `s·hash` that share an abscissa. Equal points are
/// forbidden outright, and opposite points would sum to infinity.
pub(crate) fn check_distinct(c_gamma: &Point, s_hash: &Point) -> Result<(), VrfError> {
    if c_gamma.x() == s_hash.x() {
        return Err(VrfError::CGammaEqualsSHash);
    }
    Ok(())
}

impl Proof {
    /// Check that the scalars are below the group order. The points are
    /// valid curve points by construction.
    pub fn well_formed(&self) -> Result<(), VrfError> {
        if self.c >= GROUP_ORDER {
            return Err(VrfError::MalformedProof("c is not below the group order".into()));
        }
        if self.s >= GROUP_ORDER {
            return Err(VrfError::MalformedProof("s is not below the group order".into()));
        }
        Ok(())
    }

    /// Verify the proof.
    ///
    /// Returns `Ok(false)` for a well-formed proof that does not check out,
    /// and an error for a structurally invalid one.
    pub fn verify(&self) -> Result<bool, VrfError> {
        self.well_formed()?;
        let hash = hash_to_curve(&self.public_key, &self.seed);
        let (Some(c_gamma), Some(s_hash)) = (self.gamma.mul(&self.c), hash.mul(&self.s)) else {
            return Ok(false);
        };
        check_distinct(&c_gamma, &s_hash)?;

        // u = c·pk + s·G, v = c·gamma + s·hash
        let Some(u) = self.public_key.mul_add_generator(&self.c, &self.s) else {
            return Ok(false);
        };
        let Some(v) = c_gamma.add(&s_hash) else {
            return Ok(false);
        };

        let c_prime = scalar_from_curve_points(
            &hash,
            &self.public_key,
            &self.gamma,
            &u.ethereum_address(),
            &v,
        );
        Ok(self.c == c_prime && self.output == gamma_output(&self.gamma))
    }
}

/// Generate a proof for `seed` with a caller-supplied nonce.
///
/// Fails with [`VrfError::MalformedProof`] when the challenge lands at or
/// above the group order and with [`VrfError::CGammaEqualsSHash`] on the
/// degenerate witness case; both are only reachable with negligible
/// probability and a different nonce resolves them.
///
/// # Panics
/// Panics if the constructed proof fails its own verification, which means
/// the arithmetic is broken.
pub fn generate_proof_with_nonce(
    secret_key: &SecretKey,
    seed: U256,
    nonce: U256,
) -> Result<Proof, VrfError> {
    let nonce = nonce % GROUP_ORDER;
    if nonce.is_zero() {
        return Err(VrfError::BadKeyOrSeed);
    }
    let sk = secret_key.to_u256();
    let public_key = secret_key.public_point();
    let hash = hash_to_curve(&public_key, &seed);
    let gamma = hash.mul(&sk).ok_or(VrfError::BadKeyOrSeed)?;
    let u = Point::mul_generator(&nonce).ok_or(VrfError::BadKeyOrSeed)?;
    let v = hash.mul(&nonce).ok_or(VrfError::BadKeyOrSeed)?;

    let c = scalar_from_curve_points(&hash, &public_key, &gamma, &u.ethereum_address(), &v);
    if c >= GROUP_ORDER {
        return Err(VrfError::MalformedProof("challenge is not below the group order".into()));
    }
    let s = sub_mod(nonce, mul_mod(c, sk, GROUP_ORDER), GROUP_ORDER);

    let proof = Proof {
        public_key,
        gamma,
        c,
        s,
        seed,
        output: gamma_output(&gamma),
    };
    match proof.verify() {
        Ok(true) => Ok(proof),
        Err(VrfError::CGammaEqualsSHash) => Err(VrfError::CGammaEqualsSHash),
        Ok(false) | Err(_) => panic!("constructed VRF proof failed its own verification"),
    }
}

/// Generate a proof for `seed` with a fresh random nonce, retrying with a
/// new nonce on the negligible-probability degenerate cases.
pub fn generate_proof(secret_key: &SecretKey, seed: U256) -> Result<Proof, VrfError> {
    loop {
        match generate_proof_with_nonce(secret_key, seed, random_scalar()) {
            Err(VrfError::MalformedProof(_)) | Err(VrfError::CGammaEqualsSHash) => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: u64) -> SecretKey {
        SecretKey::from_u256(U256::from(k)).unwrap()
    }

    #[test]
    fn generated_proof_verifies() {
        let proof = generate_proof(&key(1), U256::from(42u64)).unwrap();
        assert!(proof.verify().unwrap());
        assert_eq!(proof.public_key, Point::generator());
        assert_eq!(proof.seed, U256::from(42u64));
    }

    #[test]
    fn fixed_nonce_is_deterministic() {
        let nonce = U256::from(0x5eed_u64);
        let a = generate_proof_with_nonce(&key(1), U256::from(42u64), nonce).unwrap();
        let b = generate_proof_with_nonce(&key(1), U256::from(42u64), nonce).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn output_is_independent_of_nonce() {
        let a = generate_proof_with_nonce(&key(9), U256::from(7u64), U256::from(11u64)).unwrap();
        let b = generate_proof_with_nonce(&key(9), U256::from(7u64), U256::from(13u64)).unwrap();
        assert_ne!(a.c, b.c);
        assert_eq!(a.gamma, b.gamma);
        assert_eq!(a.output, b.output);
    }

    #[test]
    fn zero_nonce_is_rejected() {
        let err = generate_proof_with_nonce(&key(1), U256::one(), GROUP_ORDER).unwrap_err();
        assert_eq!(err, VrfError::BadKeyOrSeed);
    }

    #[test]
    fn tampered_seed_fails() {
        let mut proof = generate_proof(&key(3), U256::from(100u64)).unwrap();
        proof.seed = U256::from(101u64);
        assert!(!proof.verify().unwrap());
    }

    #[test]
    fn tampered_output_fails() {
        let mut proof = generate_proof(&key(3), U256::from(100u64)).unwrap();
        proof.output = proof.output ^ U256::one();
        assert!(!proof.verify().unwrap());
    }

    #[test]
    fn tampered_s_fails() {
        let mut proof = generate_proof(&key(3), U256::from(100u64)).unwrap();
        proof.s = sub_mod(proof.s, U256::one(), GROUP_ORDER);
        assert!(!proof.verify().unwrap());
    }

    #[test]
    fn oversized_c_is_malformed() {
        let mut proof = generate_proof(&key(3), U256::from(100u64)).unwrap();
        proof.c = GROUP_ORDER;
        assert!(matches!(proof.verify(), Err(VrfError::MalformedProof(_))));
    }

    #[test]
    fn wrong_key_fails() {
        let mut proof = generate_proof(&key(3), U256::from(100u64)).unwrap();
        proof.public_key = key(4).public_point();
        assert!(!proof.verify().unwrap());
    }
}
