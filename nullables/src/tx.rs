//! Nullable transaction submitter: record transactions without sending them.

use async_trait::async_trait;
use parking_lot::Mutex;
use sortes_listener::{ListenerError, TxRequest, TxSubmitter};
use sortes_types::TxHash;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct NullTxSubmitter {
    submitted: Mutex<Vec<TxRequest>>,
    /// Submissions left to reject before accepting again.
    failures_remaining: AtomicUsize,
}

impl NullTxSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` submissions.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// All accepted transactions (for assertions).
    pub fn submitted(&self) -> Vec<TxRequest> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl TxSubmitter for NullTxSubmitter {
    async fn submit(&self, tx: TxRequest) -> Result<TxHash, ListenerError> {
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ListenerError::Submission("nullable failure".into()));
        }
        let mut submitted = self.submitted.lock();
        submitted.push(tx);
        let mut hash = [0u8; 32];
        hash[24..].copy_from_slice(&(submitted.len() as u64).to_be_bytes());
        Ok(TxHash::new(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sortes_types::Address;

    fn tx() -> TxRequest {
        TxRequest {
            from: Address::ZERO,
            to: Address::ZERO,
            payload: vec![1, 2, 3],
            gas_limit: 100,
            request_ids: vec![],
        }
    }

    #[tokio::test]
    async fn records_and_fails_on_demand() {
        let submitter = NullTxSubmitter::new();
        submitter.fail_next(1);
        assert!(submitter.submit(tx()).await.is_err());
        let hash = submitter.submit(tx()).await.unwrap();
        assert!(!hash.is_zero());
        assert_eq!(submitter.submitted(), vec![tx()]);
    }
}
