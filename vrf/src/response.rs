//! Coordinator response encodings.
//!
//! Responses carry the proof with the pre-seed in the seed slot: the
//! coordinator recomputes the final seed from the pre-seed and the block
//! hash it stored for the request, so the witnesses are computed against
//! the final seed while the encoded seed is the pre-seed.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use sortes_crypto::SecretKey;
use sortes_types::{u64_to_word, Address};

use crate::solidity::{solidity_precalculations, unmarshal_solidity_proof, MarshaledProof, PROOF_LENGTH};
use crate::{final_seed, generate_proof, PreSeedData, Proof, Seed, VrfError};

/// The 416-byte proof followed by the request block number as a word.
pub const ON_CHAIN_RESPONSE_LENGTH: usize = PROOF_LENGTH + 32;

pub type MarshaledOnChainResponse = [u8; ON_CHAIN_RESPONSE_LENGTH];

/// A proof as carried in a v1 coordinator response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofResponse {
    /// The proof, with `seed` holding the pre-seed.
    pub proof: Proof,
    pub pre_seed: Seed,
    pub block_num: u64,
}

impl ProofResponse {
    /// Encode for the v1 coordinator's `fulfillRandomnessRequest`.
    ///
    /// `self.proof.seed` must be the final seed: the witnesses depend on it.
    pub fn marshal_for_vrf_coordinator(&self) -> Result<MarshaledOnChainResponse, VrfError> {
        let mut solidity_proof = solidity_precalculations(&self.proof)?;
        solidity_proof.proof.seed = self.pre_seed.to_u256();
        let mut out = [0u8; ON_CHAIN_RESPONSE_LENGTH];
        out[..PROOF_LENGTH].copy_from_slice(&solidity_proof.marshal_for_solidity_verifier());
        out[PROOF_LENGTH..].copy_from_slice(&u64_to_word(self.block_num));
        Ok(out)
    }

    /// The proof implied by on-chain data: the response's proof with the
    /// final seed restored, verified.
    pub fn crypto_proof(&self, s: &PreSeedData) -> Result<Proof, VrfError> {
        let mut proof = self.proof.clone();
        proof.seed = final_seed(s);
        if !proof.verify()? {
            return Err(VrfError::MalformedProof(
                "proof implied by on-chain data is invalid".into(),
            ));
        }
        Ok(proof)
    }
}

/// Decode a v1 coordinator response.
pub fn unmarshal_proof_response(bytes: &[u8]) -> Result<ProofResponse, VrfError> {
    if bytes.len() != ON_CHAIN_RESPONSE_LENGTH {
        return Err(VrfError::InvalidLength {
            expected: ON_CHAIN_RESPONSE_LENGTH,
            actual: bytes.len(),
        });
    }
    let proof = unmarshal_solidity_proof(&bytes[..PROOF_LENGTH])?;
    let block_word = U256::from_big_endian(&bytes[PROOF_LENGTH..]);
    if block_word > U256::from(u64::MAX) {
        return Err(VrfError::MalformedProof("block number does not fit in 64 bits".into()));
    }
    Ok(ProofResponse {
        pre_seed: Seed::from_u256(&proof.seed),
        proof,
        block_num: block_word.low_u64(),
    })
}

/// Generate the v1 on-chain response for a request.
pub fn generate_proof_response(
    secret_key: &SecretKey,
    s: &PreSeedData,
) -> Result<MarshaledOnChainResponse, VrfError> {
    let proof = generate_proof(secret_key, final_seed(s))?;
    ProofResponse {
        proof,
        pre_seed: s.pre_seed,
        block_num: s.block_num,
    }
    .marshal_for_vrf_coordinator()
}

/// The request parameters the v2 coordinator committed to when the request
/// was made; fulfillment must echo them back exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCommitment {
    pub block_num: u64,
    pub sub_id: u64,
    pub callback_gas_limit: u32,
    pub num_words: u32,
    pub sender: Address,
}

impl RequestCommitment {
    pub const ENCODED_LENGTH: usize = 5 * 32;

    /// ABI encoding of the static `(uint64,uint64,uint32,uint32,address)` tuple.
    pub fn abi_encode(&self) -> [u8; Self::ENCODED_LENGTH] {
        let mut out = [0u8; Self::ENCODED_LENGTH];
        out[..32].copy_from_slice(&u64_to_word(self.block_num));
        out[32..64].copy_from_slice(&u64_to_word(self.sub_id));
        out[64..96].copy_from_slice(&u64_to_word(u64::from(self.callback_gas_limit)));
        out[96..128].copy_from_slice(&u64_to_word(u64::from(self.num_words)));
        out[128..].copy_from_slice(&self.sender.to_word());
        out
    }
}

/// Generate the v2 proof struct for a request: the 416-byte encoding with
/// the pre-seed in the seed slot.
pub fn generate_proof_response_v2(
    secret_key: &SecretKey,
    s: &PreSeedData,
) -> Result<MarshaledProof, VrfError> {
    let proof = generate_proof(secret_key, final_seed(s))?;
    let mut solidity_proof = solidity_precalculations(&proof)?;
    solidity_proof.proof.seed = s.pre_seed.to_u256();
    Ok(solidity_proof.marshal_for_solidity_verifier())
}
