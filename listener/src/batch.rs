//! Packing proven requests into gas-bounded batches.

use sortes_types::RequestId;
use sortes_vrf::{MarshaledProof, RequestCommitment};

use crate::pending::PendingRequest;

/// A request with its proof, ready to submit.
#[derive(Clone, Debug)]
pub struct FulfillmentRun {
    pub proof: MarshaledProof,
    pub commitment: RequestCommitment,
    /// Callback gas plus proof verification gas.
    pub gas_limit: u64,
    pub request: PendingRequest,
}

impl FulfillmentRun {
    pub fn request_id(&self) -> RequestId {
        self.request.request.request_id
    }
}

#[derive(Clone, Debug, Default)]
pub struct BatchFulfillment {
    pub runs: Vec<FulfillmentRun>,
    pub total_gas_limit: u64,
}

impl BatchFulfillment {
    fn push(&mut self, run: FulfillmentRun) {
        self.total_gas_limit = self.total_gas_limit.saturating_add(run.gas_limit);
        self.runs.push(run);
    }

    pub fn request_ids(&self) -> Vec<RequestId> {
        self.runs.iter().map(FulfillmentRun::request_id).collect()
    }

    /// Summed gas scaled by `multiplier`, truncated.
    pub fn submission_gas_limit(&self, multiplier: f64) -> u64 {
        (self.total_gas_limit as f64 * multiplier) as u64
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Batches built in arrival order. A run that would push the current batch
/// over the limit starts a new one; a run larger than the limit on its own
/// still gets a batch.
pub struct BatchFulfillments {
    batches: Vec<BatchFulfillment>,
    batch_gas_limit: u64,
}

impl BatchFulfillments {
    pub fn new(batch_gas_limit: u64) -> Self {
        Self {
            batches: Vec::new(),
            batch_gas_limit,
        }
    }

    /// Append `run`, opening a new batch only if it would push the current
    /// one past the limit. A batch may reach the limit exactly.
    pub fn add_run(&mut self, run: FulfillmentRun) {
        let fits = self.batches.last().is_some_and(|current| {
            current.total_gas_limit.saturating_add(run.gas_limit) <= self.batch_gas_limit
        });
        if !fits {
            self.batches.push(BatchFulfillment::default());
        }
        if let Some(current) = self.batches.last_mut() {
            current.push(run);
        }
    }

    pub fn batches(&self) -> &[BatchFulfillment] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<BatchFulfillment> {
        self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}
