//! Nullable coordinator reader.

use async_trait::async_trait;
use parking_lot::Mutex;
use sortes_listener::{CoordinatorReader, ListenerError, Subscription};
use sortes_types::{RequestId, U256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Answers fulfillment and subscription queries from state the test
/// controls.
///
/// Subscriptions the test never mentions are funded without limit, so only
/// tests about funding need to set balances.
#[derive(Default)]
pub struct NullCoordinator {
    fulfilled: Mutex<HashSet<RequestId>>,
    balances: Mutex<HashMap<u64, U256>>,
    cancelled: Mutex<HashSet<u64>>,
    failing: AtomicBool,
    subscription_reads_failing: AtomicBool,
    queries: AtomicUsize,
}

impl NullCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_fulfilled(&self, request_id: RequestId) {
        self.fulfilled.lock().insert(request_id);
    }

    /// Make `is_fulfilled` fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make `subscription` fail as an unreachable node would.
    pub fn set_subscription_reads_failing(&self, failing: bool) {
        self.subscription_reads_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_balance(&self, sub_id: u64, balance: U256) {
        self.cancelled.lock().remove(&sub_id);
        self.balances.lock().insert(sub_id, balance);
    }

    /// Remove the subscription; later reads report it missing.
    pub fn cancel_subscription(&self, sub_id: u64) {
        self.balances.lock().remove(&sub_id);
        self.cancelled.lock().insert(sub_id);
    }

    /// Number of `is_fulfilled` calls so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoordinatorReader for NullCoordinator {
    async fn is_fulfilled(&self, request_ids: &[RequestId]) -> Result<Vec<bool>, ListenerError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ListenerError::Chain("nullable failure".into()));
        }
        let fulfilled = self.fulfilled.lock();
        Ok(request_ids.iter().map(|id| fulfilled.contains(id)).collect())
    }

    async fn subscription(&self, sub_id: u64) -> Result<Option<Subscription>, ListenerError> {
        if self.subscription_reads_failing.load(Ordering::SeqCst) {
            return Err(ListenerError::Chain("nullable failure".into()));
        }
        if self.cancelled.lock().contains(&sub_id) {
            return Ok(None);
        }
        let balance = self
            .balances
            .lock()
            .get(&sub_id)
            .copied()
            .unwrap_or(U256::MAX);
        Ok(Some(Subscription { balance }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fulfilled_ids_are_reported_positionally() {
        let coordinator = NullCoordinator::new();
        coordinator.mark_fulfilled(RequestId::from(2));
        let flags = coordinator
            .is_fulfilled(&[RequestId::from(1), RequestId::from(2)])
            .await
            .unwrap();
        assert_eq!(flags, vec![false, true]);
        assert_eq!(coordinator.query_count(), 1);
    }

    #[tokio::test]
    async fn unknown_subscription_is_fully_funded() {
        let coordinator = NullCoordinator::new();
        let sub = coordinator.subscription(9).await.unwrap().unwrap();
        assert_eq!(sub.balance, U256::MAX);
    }

    #[tokio::test]
    async fn cancelled_subscription_is_missing() {
        let coordinator = NullCoordinator::new();
        coordinator.set_balance(1, U256::from(5u64));
        assert_eq!(
            coordinator.subscription(1).await.unwrap(),
            Some(Subscription {
                balance: U256::from(5u64)
            })
        );
        coordinator.cancel_subscription(1);
        assert_eq!(coordinator.subscription(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn subscription_reads_can_fail() {
        let coordinator = NullCoordinator::new();
        coordinator.set_subscription_reads_failing(true);
        assert!(coordinator.subscription(1).await.is_err());
    }
}
