//! Elliptic-curve verifiable random function over secp256k1.
//!
//! Proofs are produced in the form the on-chain verifier consumes: the
//! hash-to-curve, challenge hash and 416-byte encoding are bit-for-bit
//! compatible with it, so a proof built here verifies on chain and a proof
//! that fails here fails there.
//!
//! - [`hash_to_curve`]: deterministic map from (public key, seed) to a point
//! - [`proof`]: proof generation and off-chain verification
//! - [`solidity`]: verifier witnesses, the fixed-layout encoding and the
//!   witness-checking verification the contract performs
//! - [`seed`]: pre-seed and block hash combination
//! - [`response`]: coordinator response encodings

pub mod error;
pub mod hash_to_curve;
pub mod proof;
pub mod response;
pub mod seed;
pub mod solidity;

pub use error::VrfError;
pub use hash_to_curve::{field_hash, hash_to_curve, scalar_from_curve_points};
pub use proof::{generate_proof, generate_proof_with_nonce, Proof};
pub use response::{
    generate_proof_response, generate_proof_response_v2, unmarshal_proof_response,
    MarshaledOnChainResponse, ProofResponse, RequestCommitment, ON_CHAIN_RESPONSE_LENGTH,
};
pub use seed::{final_seed, PreSeedData, Seed};
pub use solidity::{
    projective_ec_add, solidity_precalculations, unmarshal_solidity_proof, verify_solidity_proof,
    MarshaledProof, SolidityProof, PROOF_LENGTH,
};
