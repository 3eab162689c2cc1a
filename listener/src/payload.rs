//! Transaction payloads for the coordinator's fulfillment entry points.
//!
//! Every argument is a static tuple, so the single call is a plain
//! concatenation. The batch call takes two dynamic arrays of those tuples.

use sortes_crypto::keccak256;
use sortes_types::u64_to_word;
use sortes_vrf::{MarshaledProof, RequestCommitment, PROOF_LENGTH};

use crate::batch::BatchFulfillment;

const PROOF_TUPLE: &str =
    "(uint256[2],uint256[2],uint256,uint256,uint256,address,uint256[2],uint256[2],uint256)";
const COMMITMENT_TUPLE: &str = "(uint64,uint64,uint32,uint32,address)";

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Selector of `fulfillRandomWords(Proof,RequestCommitment)`.
pub fn fulfill_selector() -> [u8; 4] {
    selector(&format!("fulfillRandomWords({PROOF_TUPLE},{COMMITMENT_TUPLE})"))
}

/// Selector of `fulfillRandomWords(Proof[],RequestCommitment[])`.
pub fn batch_fulfill_selector() -> [u8; 4] {
    selector(&format!(
        "fulfillRandomWords({PROOF_TUPLE}[],{COMMITMENT_TUPLE}[])"
    ))
}

pub fn encode_fulfill(proof: &MarshaledProof, commitment: &RequestCommitment) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + PROOF_LENGTH + RequestCommitment::ENCODED_LENGTH);
    out.extend_from_slice(&fulfill_selector());
    out.extend_from_slice(proof);
    out.extend_from_slice(&commitment.abi_encode());
    out
}

pub fn encode_batch_fulfill(batch: &BatchFulfillment) -> Vec<u8> {
    let n = batch.runs.len();
    let proofs_offset = 64u64;
    let commitments_offset = proofs_offset + 32 + (n * PROOF_LENGTH) as u64;

    let mut out = Vec::with_capacity(
        4 + 64 + 64 + n * (PROOF_LENGTH + RequestCommitment::ENCODED_LENGTH),
    );
    out.extend_from_slice(&batch_fulfill_selector());
    out.extend_from_slice(&u64_to_word(proofs_offset));
    out.extend_from_slice(&u64_to_word(commitments_offset));

    out.extend_from_slice(&u64_to_word(n as u64));
    for run in &batch.runs {
        out.extend_from_slice(&run.proof);
    }
    out.extend_from_slice(&u64_to_word(n as u64));
    for run in &batch.runs {
        out.extend_from_slice(&run.commitment.abi_encode());
    }
    out
}
