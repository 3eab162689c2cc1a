//! End-to-end tests for the request listener:
//! log ingestion → confirmation wait → proof → fulfillment submission.
//!
//! Every chain-facing collaborator is a nullable, so each test drives the
//! listener by hand: feed logs and heads, run a processing pass, inspect
//! what was submitted and what was marked consumed.

use std::sync::Arc;
use std::time::Duration;

use sortes_crypto::PublicKey;
use sortes_keystore::{KdfParams, MemoryBackend, VrfKeyStore};
use sortes_listener::payload::{batch_fulfill_selector, fulfill_selector};
use sortes_listener::{
    JobMetrics, JobSpec, KeyStorePipeline, ListenerConfig, ListenerDeps, ListenerError,
    ListenerMetrics, RandomWordsFulfilled, RandomWordsRequested, RequestListener,
};
use sortes_nullables::{
    NullClock, NullCoordinator, NullHeadBroadcaster, NullLogBroadcaster, NullTxSubmitter,
};
use sortes_types::{Address, BlockHash, Head, RawLog, RequestId, TxHash, U256};
use sortes_vrf::{unmarshal_solidity_proof, PROOF_LENGTH};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const COORDINATOR: Address = Address::new([0xc0; 20]);
const BATCH_COORDINATOR: Address = Address::new([0xb0; 20]);

struct Harness {
    listener: RequestListener,
    logs: Arc<NullLogBroadcaster>,
    heads: Arc<NullHeadBroadcaster>,
    coordinator: Arc<NullCoordinator>,
    submitter: Arc<NullTxSubmitter>,
    clock: Arc<NullClock>,
    metrics: JobMetrics,
    public_key: PublicKey,
    key_hash: [u8; 32],
}

fn config() -> ListenerConfig {
    ListenerConfig {
        min_incoming_confirmations: 3,
        poll_period_ms: 3_600_000,
        batch_fulfillment_enabled: false,
        ..ListenerConfig::default()
    }
}

fn harness_with(config: ListenerConfig, batch: bool, from_addresses: Vec<Address>) -> Harness {
    let keystore = Arc::new(VrfKeyStore::new(
        Arc::new(MemoryBackend::new()),
        KdfParams::light(),
    ));
    let public_key = keystore.create("passphrase").unwrap();

    let logs = Arc::new(NullLogBroadcaster::new());
    let heads = Arc::new(NullHeadBroadcaster::new());
    let coordinator = Arc::new(NullCoordinator::new());
    let submitter = Arc::new(NullTxSubmitter::new());
    let clock = Arc::new(NullClock::new(1_000_000));
    let registry = ListenerMetrics::new().unwrap();
    let metrics = registry.for_job("test");

    let job = JobSpec {
        name: "test".into(),
        public_key,
        coordinator_address: COORDINATOR,
        batch_coordinator_address: batch.then_some(BATCH_COORDINATOR),
        from_addresses,
        listener: ListenerConfig {
            batch_fulfillment_enabled: batch,
            ..config.clone()
        },
    };
    let deps = ListenerDeps {
        log_broadcaster: logs.clone(),
        head_broadcaster: heads.clone(),
        coordinator: coordinator.clone(),
        tx_submitter: submitter.clone(),
        pipeline: Arc::new(KeyStorePipeline::new(
            keystore,
            public_key,
            config.proof_verification_gas,
        )),
        clock: clock.clone(),
        metrics: metrics.clone(),
    };
    let listener = RequestListener::new(job, deps).unwrap();

    Harness {
        listener,
        logs,
        heads,
        coordinator,
        submitter,
        clock,
        metrics,
        key_hash: public_key.hash().unwrap(),
        public_key,
    }
}

fn harness() -> Harness {
    harness_with(config(), false, vec![Address::new([0xf1; 20])])
}

fn base_log(block_number: u64, log_index: u64) -> RawLog {
    RawLog {
        address: COORDINATOR,
        topics: vec![],
        data: vec![],
        block_hash: BlockHash::new([block_number as u8; 32]),
        block_number,
        tx_hash: TxHash::new([0xee; 32]),
        log_index,
        removed: false,
    }
}

impl Harness {
    fn request(&self, id: u64, min_confs: u16, callback_gas_limit: u32) -> RandomWordsRequested {
        RandomWordsRequested {
            key_hash: self.key_hash,
            request_id: RequestId::from(id),
            pre_seed: U256::from(id * 7919),
            sub_id: 1,
            minimum_request_confirmations: min_confs,
            callback_gas_limit,
            num_words: 1,
            sender: Address::new([0x5e; 20]),
        }
    }

    fn request_log(&self, id: u64, block: u64, min_confs: u16) -> RawLog {
        self.request(id, min_confs, 100_000)
            .to_raw_log(base_log(block, id))
    }

    fn fulfilled_log(&self, id: u64, block: u64) -> RawLog {
        RandomWordsFulfilled {
            request_id: RequestId::from(id),
            output_seed: U256::from(1u64),
            payment: U256::from(1u64),
            success: true,
        }
        .to_raw_log(base_log(block, 1_000 + id))
    }

    async fn ingest(&self, log: RawLog) {
        self.listener.handle_log(log);
        self.listener.drain_mailbox().await;
    }

    async fn process_at(&self, head: u64) {
        self.listener
            .on_new_head(Head::new(head, BlockHash::new([head as u8; 32])));
        self.listener.process_pending_requests().await;
    }
}

async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ---------------------------------------------------------------------------
// 1. Confirmation wait and single fulfillment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_is_fulfilled_once_confirmed() {
    let h = harness();
    let log = h.request_log(1, 100, 3);
    h.ingest(log.clone()).await;
    assert_eq!(h.listener.pending_count(), 1);

    h.process_at(102).await;
    assert!(h.submitter.submitted().is_empty());
    assert_eq!(h.listener.pending_count(), 1);

    h.process_at(103).await;
    let submitted = h.submitter.submitted();
    assert_eq!(submitted.len(), 1);
    let tx = &submitted[0];
    assert_eq!(tx.to, COORDINATOR);
    assert_eq!(tx.from, Address::new([0xf1; 20]));
    assert_eq!(tx.gas_limit, 300_000);
    assert_eq!(tx.request_ids, vec![RequestId::from(1)]);
    assert_eq!(tx.payload[..4], fulfill_selector());

    let proof = unmarshal_solidity_proof(&tx.payload[4..4 + PROOF_LENGTH]).unwrap();
    assert_eq!(proof.seed, U256::from(7919u64));
    assert_eq!(proof.public_key, h.public_key.point().unwrap());

    assert!(h.logs.is_consumed(&log));
    assert_eq!(h.listener.pending_count(), 0);
    assert_eq!(h.metrics.processed_requests.get(), 1);
    assert_eq!(h.metrics.single_submissions.get(), 1);
}

#[tokio::test]
async fn request_minimum_above_node_minimum_wins() {
    let h = harness();
    h.ingest(h.request_log(1, 100, 10)).await;
    h.process_at(109).await;
    assert!(h.submitter.submitted().is_empty());
    h.process_at(110).await;
    assert_eq!(h.submitter.submitted().len(), 1);
}

#[tokio::test]
async fn requested_confs_delay_is_added() {
    let h = harness_with(
        ListenerConfig {
            requested_confs_delay: 5,
            ..config()
        },
        false,
        vec![Address::new([0xf1; 20])],
    );
    h.ingest(h.request_log(1, 100, 3)).await;
    h.process_at(107).await;
    assert!(h.submitter.submitted().is_empty());
    h.process_at(108).await;
    assert_eq!(h.submitter.submitted().len(), 1);
}

// ---------------------------------------------------------------------------
// 2. Duplicate handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_after_fulfillment_needs_doubled_confirmations() {
    let h = harness();
    let fulfilled = h.fulfilled_log(1, 90);
    h.ingest(fulfilled.clone()).await;
    assert_eq!(h.listener.response_count(&RequestId::from(1)), 1);
    assert!(h.logs.is_consumed(&fulfilled));

    h.ingest(h.request_log(1, 100, 10)).await;
    assert_eq!(h.metrics.duplicate_requests.get(), 1);

    h.process_at(119).await;
    assert!(h.submitter.submitted().is_empty());
    h.process_at(120).await;
    assert_eq!(h.submitter.submitted().len(), 1);
}

#[tokio::test]
async fn redelivered_log_is_ingested_once() {
    let h = harness();
    let log = h.request_log(1, 100, 3);
    h.ingest(log.clone()).await;
    h.ingest(log.clone()).await;
    assert_eq!(h.listener.pending_count(), 1);
}

#[tokio::test]
async fn replay_clears_dedup() {
    let h = harness();
    h.listener.start().unwrap();
    let log = h.request_log(1, 100, 3);
    h.logs.emit(log.clone());
    assert!(eventually(|| h.listener.pending_count() == 1).await);

    h.logs.start_replay();
    h.logs.emit(log);
    assert!(eventually(|| h.listener.pending_count() == 2).await);
    h.listener.stop().await.unwrap();
}

#[tokio::test]
async fn reemitted_request_counts_once_in_pending_gauge() {
    let h = harness();
    h.ingest(h.request_log(1, 100, 3)).await;
    // Same request id in a log from a different block, as after a reorg.
    h.ingest(h.request(1, 3, 100_000).to_raw_log(base_log(101, 1))).await;
    assert_eq!(h.listener.pending_count(), 2);
    assert_eq!(h.metrics.pending_requests.get(), 1);

    h.process_at(50).await;
    assert_eq!(h.metrics.pending_requests.get(), 1);
}

#[tokio::test]
async fn consumed_fulfillment_is_not_counted_twice() {
    let h = harness();
    let fulfilled = h.fulfilled_log(1, 90);
    h.ingest(fulfilled.clone()).await;
    h.logs.start_replay();
    h.ingest(fulfilled).await;
    assert_eq!(h.listener.response_count(&RequestId::from(1)), 1);
}

#[tokio::test]
async fn fulfillment_counts_expire_after_lookback() {
    let h = harness();
    h.ingest(h.fulfilled_log(1, 1)).await;
    h.ingest(h.fulfilled_log(2, 2)).await;

    h.process_at(10_001).await;
    assert_eq!(h.listener.response_count(&RequestId::from(1)), 0);
    assert_eq!(h.listener.response_count(&RequestId::from(2)), 1);

    h.process_at(10_002).await;
    assert_eq!(h.listener.response_count(&RequestId::from(2)), 0);
}

// ---------------------------------------------------------------------------
// 3. Filtering and malformed input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_for_other_key_is_ignored() {
    let h = harness();
    let mut request = h.request(1, 3, 100_000);
    request.key_hash = [0x99; 32];
    h.ingest(request.to_raw_log(base_log(100, 0))).await;
    assert_eq!(h.listener.pending_count(), 0);
}

#[tokio::test]
async fn unparseable_log_is_marked_consumed() {
    let h = harness();
    let mut log = base_log(100, 0);
    log.topics = vec![[0x42; 32]];
    h.ingest(log.clone()).await;
    assert!(h.logs.is_consumed(&log));
    assert_eq!(h.listener.pending_count(), 0);
}

#[tokio::test]
async fn full_mailbox_drops_oldest_log() {
    let h = harness_with(
        ListenerConfig {
            mailbox_capacity: 2,
            ..config()
        },
        false,
        vec![Address::new([0xf1; 20])],
    );
    for id in 1..=3 {
        h.listener.handle_log(h.request_log(id, 100, 3));
    }
    h.listener.drain_mailbox().await;
    assert_eq!(h.listener.pending_count(), 2);
    assert_eq!(h.metrics.dropped_mailbox.get(), 1);

    h.process_at(103).await;
    let ids: Vec<_> = h
        .submitter
        .submitted()
        .iter()
        .flat_map(|tx| tx.request_ids.clone())
        .collect();
    assert!(!ids.contains(&RequestId::from(1)));
}

// ---------------------------------------------------------------------------
// 4. Coordinator checks, failures and retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn already_fulfilled_request_is_skipped() {
    let h = harness();
    let log = h.request_log(1, 100, 3);
    h.ingest(log.clone()).await;
    h.coordinator.mark_fulfilled(RequestId::from(1));

    h.process_at(103).await;
    assert!(h.submitter.submitted().is_empty());
    assert!(h.logs.is_consumed(&log));
    assert_eq!(h.listener.pending_count(), 0);
    assert_eq!(h.metrics.skipped_fulfilled.get(), 1);
}

#[tokio::test]
async fn fulfillment_check_failure_proceeds_anyway() {
    let h = harness();
    h.ingest(h.request_log(1, 100, 3)).await;
    h.coordinator.set_failing(true);
    h.process_at(103).await;
    assert_eq!(h.submitter.submitted().len(), 1);
    assert_eq!(h.coordinator.query_count(), 1);
}

#[tokio::test]
async fn consumption_check_failure_defers_request() {
    let h = harness();
    let log = h.request_log(1, 100, 3);
    h.ingest(log.clone()).await;

    h.logs.set_consumption_checks_failing(true);
    h.process_at(103).await;
    assert!(h.submitter.submitted().is_empty());
    assert!(!h.logs.is_consumed(&log));
    assert_eq!(h.listener.pending_count(), 1);

    h.logs.set_consumption_checks_failing(false);
    h.process_at(104).await;
    assert_eq!(h.submitter.submitted().len(), 1);
}

#[tokio::test]
async fn failed_submission_is_retried() {
    let h = harness();
    let log = h.request_log(1, 100, 3);
    h.ingest(log.clone()).await;
    h.submitter.fail_next(1);

    h.process_at(103).await;
    assert!(h.submitter.submitted().is_empty());
    assert!(!h.logs.is_consumed(&log));
    assert_eq!(h.listener.pending_count(), 1);

    h.process_at(104).await;
    assert_eq!(h.submitter.submitted().len(), 1);
    assert!(h.logs.is_consumed(&log));
}

#[tokio::test]
async fn retry_waits_for_backoff() {
    let h = harness_with(
        ListenerConfig {
            backoff_initial_delay_secs: 10,
            ..config()
        },
        false,
        vec![Address::new([0xf1; 20])],
    );
    h.ingest(h.request_log(1, 100, 3)).await;
    h.submitter.fail_next(1);
    h.process_at(103).await;

    h.process_at(104).await;
    assert!(h.submitter.submitted().is_empty());

    h.clock.advance(10);
    h.process_at(105).await;
    assert_eq!(h.submitter.submitted().len(), 1);
}

#[tokio::test]
async fn stale_request_is_dropped() {
    let h = harness_with(
        ListenerConfig {
            request_timeout_secs: 60,
            ..config()
        },
        false,
        vec![Address::new([0xf1; 20])],
    );
    let log = h.request_log(1, 100, 3);
    h.ingest(log.clone()).await;
    h.clock.advance(61);

    h.process_at(103).await;
    assert!(h.submitter.submitted().is_empty());
    assert!(h.logs.is_consumed(&log));
    assert_eq!(h.listener.pending_count(), 0);
    assert_eq!(h.metrics.dropped_age.get(), 1);
}

#[tokio::test]
async fn missing_from_address_keeps_request_pending() {
    let h = harness_with(config(), false, vec![]);
    h.ingest(h.request_log(1, 100, 3)).await;
    h.process_at(103).await;
    assert!(h.submitter.submitted().is_empty());
    assert_eq!(h.listener.pending_count(), 1);
}

// ---------------------------------------------------------------------------
// 5. Batching and sender rotation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn confirmed_requests_are_batched_by_gas() {
    let h = harness_with(
        ListenerConfig {
            batch_gas_limit: 700_000,
            ..config()
        },
        true,
        vec![Address::new([0xf1; 20])],
    );
    let mut logs = Vec::new();
    for id in 1..=4 {
        let log = h.request_log(id, 100, 3);
        logs.push(log.clone());
        h.ingest(log).await;
    }

    h.process_at(103).await;
    let submitted = h.submitter.submitted();
    assert_eq!(submitted.len(), 2);
    for tx in &submitted {
        assert_eq!(tx.to, BATCH_COORDINATOR);
        assert_eq!(tx.request_ids.len(), 2);
        assert_eq!(tx.gas_limit, 690_000);
        assert_eq!(tx.payload[..4], batch_fulfill_selector());
    }
    assert!(logs.iter().all(|log| h.logs.is_consumed(log)));
    assert_eq!(h.metrics.batch_submissions.get(), 2);
    assert_eq!(h.metrics.processed_requests.get(), 4);
}

#[tokio::test]
async fn batching_without_batch_coordinator_falls_back_to_single() {
    let h = harness_with(
        ListenerConfig {
            batch_fulfillment_enabled: true,
            ..config()
        },
        false,
        vec![Address::new([0xf1; 20])],
    );
    h.ingest(h.request_log(1, 100, 3)).await;
    h.process_at(103).await;
    let submitted = h.submitter.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].to, COORDINATOR);
}

#[tokio::test]
async fn senders_rotate_round_robin() {
    let senders = vec![Address::new([0xa1; 20]), Address::new([0xa2; 20])];
    let h = harness_with(config(), false, senders.clone());
    for id in 1..=3 {
        h.ingest(h.request_log(id, 100, 3)).await;
    }
    h.process_at(103).await;
    let from: Vec<_> = h.submitter.submitted().iter().map(|tx| tx.from).collect();
    assert_eq!(from, vec![senders[0], senders[1], senders[0]]);
}

#[tokio::test]
async fn cheaper_callbacks_are_processed_first() {
    let h = harness();
    let expensive = h.request(1, 3, 900_000).to_raw_log(base_log(100, 1));
    let cheap = h.request(2, 3, 50_000).to_raw_log(base_log(100, 2));
    h.ingest(expensive).await;
    h.ingest(cheap).await;
    h.process_at(103).await;
    let ids: Vec<_> = h
        .submitter
        .submitted()
        .iter()
        .flat_map(|tx| tx.request_ids.clone())
        .collect();
    assert_eq!(ids, vec![RequestId::from(2), RequestId::from(1)]);
}

// ---------------------------------------------------------------------------
// 6. Subscription funding
// ---------------------------------------------------------------------------

/// One wei per gas, so a request costs exactly its fulfillment gas.
fn priced_config() -> ListenerConfig {
    ListenerConfig {
        max_gas_price_wei: 1,
        ..config()
    }
}

fn sub_request_log(h: &Harness, id: u64, sub_id: u64, callback_gas_limit: u32) -> RawLog {
    RandomWordsRequested {
        sub_id,
        ..h.request(id, 3, callback_gas_limit)
    }
    .to_raw_log(base_log(100, id))
}

fn submitted_ids(h: &Harness) -> Vec<RequestId> {
    h.submitter
        .submitted()
        .iter()
        .flat_map(|tx| tx.request_ids.clone())
        .collect()
}

#[tokio::test]
async fn underfunded_subscription_waits_while_funded_one_is_fulfilled() {
    let h = harness_with(
        ListenerConfig {
            backoff_initial_delay_secs: 60,
            ..priced_config()
        },
        false,
        vec![Address::new([0xf1; 20])],
    );
    // 100k callback + 200k verification.
    h.coordinator.set_balance(1, U256::from(299_999u64));
    let starved = sub_request_log(&h, 1, 1, 100_000);
    h.ingest(starved.clone()).await;
    h.ingest(sub_request_log(&h, 2, 2, 100_000)).await;

    h.process_at(103).await;
    assert_eq!(submitted_ids(&h), vec![RequestId::from(2)]);
    assert_eq!(h.listener.pending_count(), 1);
    assert!(!h.logs.is_consumed(&starved));
    assert_eq!(h.metrics.underfunded_requests.get(), 1);

    // No attempt was counted, so the top-up is honoured without backoff.
    h.coordinator.set_balance(1, U256::from(300_000u64));
    h.process_at(104).await;
    assert_eq!(submitted_ids(&h), vec![RequestId::from(2), RequestId::from(1)]);
    assert!(h.logs.is_consumed(&starved));
    assert_eq!(h.listener.pending_count(), 0);
}

#[tokio::test]
async fn balance_is_spent_on_cheapest_requests_first() {
    let h = harness_with(priced_config(), false, vec![Address::new([0xf1; 20])]);
    // 250k + 300k fit, the 400k request does not.
    h.coordinator.set_balance(1, U256::from(600_000u64));
    h.ingest(sub_request_log(&h, 1, 1, 200_000)).await;
    h.ingest(sub_request_log(&h, 2, 1, 50_000)).await;
    h.ingest(sub_request_log(&h, 3, 1, 100_000)).await;

    h.process_at(103).await;
    assert_eq!(submitted_ids(&h), vec![RequestId::from(2), RequestId::from(3)]);
    assert_eq!(h.listener.pending_count(), 1);
    assert_eq!(h.metrics.underfunded_requests.get(), 1);
}

#[tokio::test]
async fn cancelled_subscription_is_treated_as_empty() {
    let h = harness_with(priced_config(), false, vec![Address::new([0xf1; 20])]);
    h.coordinator.cancel_subscription(1);
    let log = sub_request_log(&h, 1, 1, 100_000);
    h.ingest(log.clone()).await;

    h.process_at(103).await;
    assert!(h.submitter.submitted().is_empty());
    assert!(!h.logs.is_consumed(&log));
    assert_eq!(h.listener.pending_count(), 1);
}

#[tokio::test]
async fn subscription_read_failure_defers_requests() {
    let h = harness();
    h.ingest(h.request_log(1, 100, 3)).await;
    h.coordinator.set_subscription_reads_failing(true);
    h.process_at(103).await;
    assert!(h.submitter.submitted().is_empty());
    assert_eq!(h.listener.pending_count(), 1);

    h.coordinator.set_subscription_reads_failing(false);
    h.process_at(104).await;
    assert_eq!(h.submitter.submitted().len(), 1);
}

// ---------------------------------------------------------------------------
// 7. Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn running_listener_fulfills_on_new_head() {
    let h = harness();
    h.listener.start().unwrap();
    assert_eq!(h.logs.subscriber_count(), 1);
    assert_eq!(h.heads.subscriber_count(), 1);

    let log = h.request_log(1, 100, 3);
    h.logs.emit(log.clone());
    assert!(eventually(|| h.listener.pending_count() == 1).await);

    h.heads.new_head(103);
    assert!(eventually(|| h.submitter.submitted().len() == 1).await);
    assert!(eventually(|| h.logs.is_consumed(&log)).await);

    h.listener.stop().await.unwrap();
    assert_eq!(h.logs.subscriber_count(), 0);
    assert_eq!(h.heads.subscriber_count(), 0);
}

#[tokio::test]
async fn start_picks_up_current_head() {
    let h = harness();
    h.heads.new_head(500);
    h.listener.start().unwrap();
    assert_eq!(h.listener.latest_head(), 500);
    h.listener.stop().await.unwrap();
}

#[tokio::test]
async fn head_never_moves_backwards() {
    let h = harness();
    h.process_at(200).await;
    h.process_at(150).await;
    assert_eq!(h.listener.latest_head(), 200);
}

#[tokio::test]
async fn double_start_is_rejected() {
    let h = harness();
    h.listener.start().unwrap();
    assert!(matches!(h.listener.start(), Err(ListenerError::AlreadyStarted)));
    h.listener.stop().await.unwrap();
}

#[tokio::test]
async fn stop_before_start_is_rejected() {
    let h = harness();
    assert!(matches!(h.listener.stop().await, Err(ListenerError::NotStarted)));
}
