//! Proof generation for a confirmed request.

use async_trait::async_trait;
use sortes_crypto::PublicKey;
use sortes_keystore::VrfKeyStore;
use sortes_vrf::{MarshaledProof, PreSeedData, RequestCommitment, Seed};
use std::sync::Arc;

use crate::pending::PendingRequest;
use crate::ListenerError;

/// What fulfilling a request needs beyond the request itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineOutput {
    pub proof: MarshaledProof,
    pub commitment: RequestCommitment,
    pub gas_limit: u64,
}

#[async_trait]
pub trait FulfillmentPipeline: Send + Sync {
    async fn run(&self, request: &PendingRequest) -> Result<PipelineOutput, ListenerError>;
}

/// Proves with an unlocked key from the keystore. Proving is CPU-bound
/// and runs on the blocking pool.
pub struct KeyStorePipeline {
    keystore: Arc<VrfKeyStore>,
    public_key: PublicKey,
    proof_verification_gas: u64,
}

impl KeyStorePipeline {
    pub fn new(keystore: Arc<VrfKeyStore>, public_key: PublicKey, proof_verification_gas: u64) -> Self {
        Self {
            keystore,
            public_key,
            proof_verification_gas,
        }
    }
}

#[async_trait]
impl FulfillmentPipeline for KeyStorePipeline {
    async fn run(&self, request: &PendingRequest) -> Result<PipelineOutput, ListenerError> {
        let pre_seed_data = PreSeedData {
            pre_seed: Seed::from_u256(&request.request.pre_seed),
            block_hash: request.log.block_hash,
            block_num: request.log.block_number,
        };
        let keystore = Arc::clone(&self.keystore);
        let public_key = self.public_key;
        let proof = tokio::task::spawn_blocking(move || {
            keystore.generate_proof_v2(&public_key, &pre_seed_data)
        })
        .await
        .map_err(|e| ListenerError::Pipeline(e.to_string()))??;

        let req = &request.request;
        Ok(PipelineOutput {
            proof,
            commitment: RequestCommitment {
                block_num: request.log.block_number,
                sub_id: req.sub_id,
                callback_gas_limit: req.callback_gas_limit,
                num_words: req.num_words,
                sender: req.sender,
            },
            gas_limit: u64::from(req.callback_gas_limit).saturating_add(self.proof_verification_gas),
        })
    }
}
