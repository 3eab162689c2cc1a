//! The request listener for one VRF job.
//!
//! Two tasks share one [`ListenerState`]:
//!
//! * **ingestion** drains the mailbox and turns logs into pending requests
//!   or fulfillment counts;
//! * **request handling** wakes on new heads or a poll tick, proves every
//!   request that has its confirmations and whose subscription can pay for
//!   it, and submits fulfillments.
//!
//! Each piece of shared state has its own lock and no code path holds two
//! of them at once.

use parking_lot::Mutex;
use sortes_types::{Address, Clock, Head, RawLog, RequestId, Timestamp, U256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::backoff::Backoff;
use crate::batch::{BatchFulfillment, BatchFulfillments, FulfillmentRun};
use crate::chain::{
    CoordinatorReader, HeadBroadcaster, HeadSink, LogBroadcaster, LogSink, TxRequest,
    TxSubmitter, Unsubscribe,
};
use crate::confirmations::{required_confirmations, ResponseCounter};
use crate::config::{JobSpec, ListenerConfig};
use crate::dedup::LogDeduper;
use crate::events::{decode_log, CoordinatorEvent, RandomWordsRequested};
use crate::mailbox::Mailbox;
use crate::metrics::JobMetrics;
use crate::payload::{encode_batch_fulfill, encode_fulfill};
use crate::pending::{PendingQueue, PendingRequest};
use crate::pipeline::FulfillmentPipeline;
use crate::ListenerError;

/// Everything a listener talks to.
#[derive(Clone)]
pub struct ListenerDeps {
    pub log_broadcaster: Arc<dyn LogBroadcaster>,
    pub head_broadcaster: Arc<dyn HeadBroadcaster>,
    pub coordinator: Arc<dyn CoordinatorReader>,
    pub tx_submitter: Arc<dyn TxSubmitter>,
    pub pipeline: Arc<dyn FulfillmentPipeline>,
    pub clock: Arc<dyn Clock>,
    pub metrics: JobMetrics,
}

pub struct RequestListener {
    state: Arc<ListenerState>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl RequestListener {
    pub fn new(job: JobSpec, deps: ListenerDeps) -> Result<Self, ListenerError> {
        let key_hash = job
            .public_key
            .hash()
            .map_err(|e| ListenerError::Config(format!("job {}: {e}", job.name)))?;
        if job.listener.batch_fulfillment_enabled && job.batch_coordinator_address.is_none() {
            debug!(job = %job.name, "batch fulfillment enabled without a batch coordinator");
        }
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            state: Arc::new(ListenerState::new(job, key_hash, deps)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Subscribe to logs and heads and spawn both tasks.
    pub fn start(&self) -> Result<(), ListenerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ListenerError::AlreadyStarted);
        }
        let state = &self.state;

        let unsubscribe_logs = state
            .deps
            .log_broadcaster
            .register(state.job.coordinator_address, Arc::clone(state) as Arc<dyn LogSink>);
        let (head, unsubscribe_heads) = state
            .deps
            .head_broadcaster
            .subscribe(Arc::clone(state) as Arc<dyn HeadSink>);
        if let Some(head) = head {
            state.on_new_head(head);
        }

        let ingestion = tokio::spawn(run_ingestion(
            Arc::clone(state),
            self.shutdown_tx.subscribe(),
            vec![unsubscribe_logs, unsubscribe_heads],
        ));
        let handler = tokio::spawn(run_request_handler(
            Arc::clone(state),
            self.shutdown_tx.subscribe(),
        ));
        self.handles.lock().extend([ingestion, handler]);

        info!(
            job = %state.job.name,
            coordinator = %state.job.coordinator_address,
            public_key = %state.job.public_key,
            "request listener started"
        );
        Ok(())
    }

    /// Signal both tasks and wait for them to finish.
    pub async fn stop(&self) -> Result<(), ListenerError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(ListenerError::NotStarted);
        }
        let _ = self.shutdown_tx.send(());
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(job = %self.state.job.name, error = %e, "listener task panicked");
            }
        }
        info!(job = %self.state.job.name, "request listener stopped");
        Ok(())
    }

    pub fn job(&self) -> &JobSpec {
        &self.state.job
    }

    pub fn latest_head(&self) -> u64 {
        self.state.latest_head.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending.lock().len()
    }

    /// Fulfillments seen for `request_id` within the lookback window.
    pub fn response_count(&self, request_id: &RequestId) -> u64 {
        self.state.responses.lock().count(request_id)
    }

    /// Feed a log as if it came from the log broadcaster.
    pub fn handle_log(&self, log: RawLog) {
        LogSink::handle_log(self.state.as_ref(), log)
    }

    /// Feed a head as if it came from the head broadcaster.
    pub fn on_new_head(&self, head: Head) {
        self.state.on_new_head(head)
    }

    /// Run one processing pass immediately.
    pub async fn process_pending_requests(&self) {
        self.state.process_pending_requests().await
    }

    /// Drain and handle whatever is in the mailbox immediately.
    pub async fn drain_mailbox(&self) {
        self.state.drain_mailbox().await
    }
}

async fn run_ingestion(
    state: Arc<ListenerState>,
    mut shutdown_rx: broadcast::Receiver<()>,
    unsubscribes: Vec<Unsubscribe>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = state.mailbox.notified() => state.drain_mailbox().await,
        }
    }
    for unsubscribe in unsubscribes {
        unsubscribe.call();
    }
    debug!(job = %state.job.name, "ingestion task exited");
}

async fn run_request_handler(state: Arc<ListenerState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(state.config().poll_period());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = state.head_notify.notified() => {}
            _ = ticker.tick() => {}
        }
        state.process_pending_requests().await;
    }
    debug!(job = %state.job.name, "request handler task exited");
}

struct ListenerState {
    job: JobSpec,
    key_hash: [u8; 32],
    deps: ListenerDeps,
    backoff: Backoff,
    dedup: LogDeduper,
    mailbox: Mailbox<RawLog>,
    pending: Mutex<PendingQueue>,
    responses: Mutex<ResponseCounter>,
    latest_head: AtomicU64,
    head_notify: Notify,
    next_from: AtomicUsize,
}

impl ListenerState {
    fn new(job: JobSpec, key_hash: [u8; 32], deps: ListenerDeps) -> Self {
        let config = &job.listener;
        Self {
            key_hash,
            backoff: Backoff::new(config.backoff_initial_delay_secs, config.backoff_max_delay_secs),
            dedup: LogDeduper::new(config.dedup_lookback_blocks, config.dedup_prune_interval),
            mailbox: Mailbox::new(config.mailbox_capacity),
            pending: Mutex::new(PendingQueue::new()),
            responses: Mutex::new(ResponseCounter::new(config.response_lookback_blocks)),
            latest_head: AtomicU64::new(0),
            head_notify: Notify::new(),
            next_from: AtomicUsize::new(0),
            deps,
            job,
        }
    }

    fn config(&self) -> &ListenerConfig {
        &self.job.listener
    }

    async fn drain_mailbox(&self) {
        for log in self.mailbox.retrieve_all() {
            self.ingest_log(log).await;
        }
    }

    async fn ingest_log(&self, log: RawLog) {
        match decode_log(&log) {
            Ok(CoordinatorEvent::Fulfilled(event)) => {
                match self.deps.log_broadcaster.was_already_consumed(&log).await {
                    Ok(false) => {}
                    Ok(true) => return,
                    Err(e) => {
                        error!(job = %self.job.name, error = %e, "could not determine if log was already consumed");
                        return;
                    }
                }
                self.responses
                    .lock()
                    .record(event.request_id, log.block_number);
                debug!(
                    job = %self.job.name,
                    request_id = %event.request_id,
                    block = log.block_number,
                    "recorded fulfillment"
                );
                self.mark_consumed(&log).await;
            }
            Ok(CoordinatorEvent::Requested(request)) => {
                if request.key_hash != self.key_hash {
                    trace!(job = %self.job.name, request_id = %request.request_id, "request for another key");
                    return;
                }
                let confirmed_at_block = self.confirmed_at(&request, log.block_number);
                info!(
                    job = %self.job.name,
                    request_id = %request.request_id,
                    block = log.block_number,
                    confirmed_at_block,
                    "received randomness request"
                );
                let pending = {
                    let mut queue = self.pending.lock();
                    queue.push(PendingRequest {
                        confirmed_at_block,
                        request,
                        log,
                        first_seen: self.deps.clock.now(),
                        attempts: 0,
                        last_try: Timestamp::EPOCH,
                    });
                    queue.unique_request_count()
                };
                self.deps.metrics.pending_requests.set(pending as i64);
            }
            Err(e) => {
                error!(job = %self.job.name, error = %e, tx = %log.tx_hash, "failed to parse log");
                match self.deps.log_broadcaster.was_already_consumed(&log).await {
                    Ok(false) => self.mark_consumed(&log).await,
                    Ok(true) => {}
                    Err(e) => {
                        error!(job = %self.job.name, error = %e, "could not determine if log was already consumed");
                    }
                }
            }
        }
    }

    /// Block at which a request observed at `block_number` is confirmed.
    fn confirmed_at(&self, request: &RandomWordsRequested, block_number: u64) -> u64 {
        let config = self.config();
        let base = config.min_incoming_confirmations.max(
            u64::from(request.minimum_request_confirmations)
                .saturating_add(config.requested_confs_delay),
        );
        let dup_count = self.responses.lock().count(&request.request_id);
        if dup_count > 0 {
            warn!(
                job = %self.job.name,
                request_id = %request.request_id,
                dup_count,
                "duplicate request found after fulfillment, escalating confirmations"
            );
            self.deps.metrics.duplicate_requests.inc();
        }
        block_number.saturating_add(required_confirmations(
            base,
            dup_count,
            config.confirmation_cap,
        ))
    }

    async fn process_pending_requests(&self) {
        let latest_head = self.latest_head.load(Ordering::SeqCst);
        let now = self.deps.clock.now();
        let timeout = self.config().request_timeout_secs;

        let (expired, ready) = {
            let mut queue = self.pending.lock();
            let expired = queue.drain_where(|r| r.first_seen.has_expired(timeout, now));
            let ready = queue.drain_where(|r| {
                r.confirmed_at_block <= latest_head
                    && self.backoff.may_retry(r.attempts, r.last_try, now)
            });
            (expired, ready)
        };

        for request in &expired {
            warn!(
                job = %self.job.name,
                request_id = %request.request.request_id,
                first_seen = %request.first_seen,
                "request too old, dropping"
            );
            self.deps.metrics.dropped_age.inc();
            self.mark_consumed(&request.log).await;
        }

        if !ready.is_empty() {
            debug!(job = %self.job.name, ready = ready.len(), latest_head, "processing confirmed requests");
            let chunk_size = self.config().chunk_size.max(1);
            let mut retry = Vec::new();
            let mut deferred = Vec::new();
            for (sub_id, mut requests) in group_by_subscription(ready) {
                requests.sort_by_key(|r| r.request.callback_gas_limit);
                let mut funded = self.take_funded(sub_id, &mut requests).await;
                deferred.append(&mut requests);
                while !funded.is_empty() {
                    let rest = funded.split_off(chunk_size.min(funded.len()));
                    let chunk = std::mem::replace(&mut funded, rest);
                    retry.extend(self.process_chunk(chunk).await);
                }
            }

            if !retry.is_empty() || !deferred.is_empty() {
                let mut queue = self.pending.lock();
                for mut request in retry {
                    request.attempts = request.attempts.saturating_add(1);
                    request.last_try = now;
                    queue.push(request);
                }
                // Nothing was attempted for these, so no backoff accrues.
                for request in deferred {
                    queue.push(request);
                }
            }
        }

        let pruned = self.responses.lock().prune(latest_head);
        if pruned > 0 {
            trace!(job = %self.job.name, pruned, "pruned fulfillment counts");
        }
        let pending = self.pending.lock().unique_request_count();
        self.deps.metrics.pending_requests.set(pending as i64);
    }

    /// Split off the cheapest prefix of `requests` that the subscription's
    /// balance covers at the configured gas price, leaving the rest in
    /// `requests`. A missing subscription has no balance; a failed read
    /// leaves every request in place until the next pass.
    async fn take_funded(&self, sub_id: u64, requests: &mut Vec<PendingRequest>) -> Vec<PendingRequest> {
        let mut remaining = match self.deps.coordinator.subscription(sub_id).await {
            Ok(Some(subscription)) => subscription.balance,
            Ok(None) => {
                warn!(job = %self.job.name, sub_id, "subscription not found, treating balance as zero");
                U256::zero()
            }
            Err(e) => {
                error!(job = %self.job.name, sub_id, error = %e, "unable to read subscription balance");
                return Vec::new();
            }
        };

        let config = self.config();
        let gas_price = U256::from(config.max_gas_price_wei);
        let mut affordable = 0;
        for request in requests.iter() {
            let max_fee = U256::from(config.fulfillment_gas(request.request.callback_gas_limit))
                .saturating_mul(gas_price);
            if remaining < max_fee {
                break;
            }
            remaining -= max_fee;
            affordable += 1;
        }

        let unfunded = requests.split_off(affordable);
        let funded = std::mem::replace(requests, unfunded);
        if !requests.is_empty() {
            info!(
                job = %self.job.name,
                sub_id,
                deferred = requests.len(),
                remaining_balance = %remaining,
                "insufficient subscription balance, leaving requests pending"
            );
            self.deps.metrics.underfunded_requests.inc_by(requests.len() as u64);
        }
        funded
    }

    /// Prove and submit one chunk. Returns the requests to retry.
    async fn process_chunk(&self, chunk: Vec<PendingRequest>) -> Vec<PendingRequest> {
        let mut retry = Vec::new();
        let mut candidates = Vec::with_capacity(chunk.len());
        for request in chunk {
            match self.deps.log_broadcaster.was_already_consumed(&request.log).await {
                Ok(false) => candidates.push(request),
                Ok(true) => {
                    trace!(job = %self.job.name, request_id = %request.request.request_id, "log already consumed");
                }
                Err(e) => {
                    warn!(
                        job = %self.job.name,
                        request_id = %request.request.request_id,
                        error = %e,
                        "consumption check failed, will retry"
                    );
                    retry.push(request);
                }
            }
        }
        if candidates.is_empty() {
            return retry;
        }

        let candidates = self.skip_fulfilled(candidates).await;

        let outputs = futures_util::future::join_all(candidates.iter().map(|request| async move {
            let started = Instant::now();
            let result = self.deps.pipeline.run(request).await;
            self.deps
                .metrics
                .proof_generation_ms
                .observe(started.elapsed().as_secs_f64() * 1000.0);
            result
        }))
        .await;

        let mut runs = Vec::with_capacity(candidates.len());
        for (request, output) in candidates.into_iter().zip(outputs) {
            match output {
                Ok(output) => runs.push(FulfillmentRun {
                    proof: output.proof,
                    commitment: output.commitment,
                    gas_limit: output.gas_limit,
                    request,
                }),
                Err(e) => {
                    error!(
                        job = %self.job.name,
                        request_id = %request.request.request_id,
                        error = %e,
                        "failed to generate proof"
                    );
                    retry.push(request);
                }
            }
        }

        match self.batch_coordinator() {
            Some(batch_coordinator) => {
                let mut batches = BatchFulfillments::new(self.config().batch_gas_limit);
                for run in runs {
                    batches.add_run(run);
                }
                for batch in batches.into_batches() {
                    retry.extend(self.submit_batch(batch_coordinator, batch).await);
                }
            }
            None => {
                for run in runs {
                    if let Some(request) = self.submit_single(run).await {
                        retry.push(request);
                    }
                }
            }
        }
        retry
    }

    /// Drop requests the coordinator already fulfilled. If the check itself
    /// fails every candidate proceeds.
    async fn skip_fulfilled(&self, candidates: Vec<PendingRequest>) -> Vec<PendingRequest> {
        let ids: Vec<RequestId> = candidates.iter().map(|r| r.request.request_id).collect();
        let fulfilled = match self.deps.coordinator.is_fulfilled(&ids).await {
            Ok(flags) if flags.len() == ids.len() => flags,
            Ok(flags) => {
                warn!(
                    job = %self.job.name,
                    expected = ids.len(),
                    got = flags.len(),
                    "fulfillment check returned wrong count, proceeding anyway"
                );
                return candidates;
            }
            Err(e) => {
                warn!(job = %self.job.name, error = %e, "unable to check if requests already fulfilled, proceeding anyway");
                return candidates;
            }
        };

        let mut remaining = Vec::with_capacity(candidates.len());
        for (request, done) in candidates.into_iter().zip(fulfilled) {
            if done {
                info!(job = %self.job.name, request_id = %request.request.request_id, "request already fulfilled");
                self.deps.metrics.skipped_fulfilled.inc();
                self.mark_consumed(&request.log).await;
            } else {
                remaining.push(request);
            }
        }
        remaining
    }

    fn batch_coordinator(&self) -> Option<Address> {
        if self.config().batch_fulfillment_enabled {
            self.job.batch_coordinator_address
        } else {
            None
        }
    }

    async fn submit_batch(&self, to: Address, batch: BatchFulfillment) -> Vec<PendingRequest> {
        let Some(from) = self.next_from_address() else {
            error!(job = %self.job.name, "no from addresses configured");
            return batch.runs.into_iter().map(|run| run.request).collect();
        };
        let request_ids = batch.request_ids();
        let tx = TxRequest {
            from,
            to,
            payload: encode_batch_fulfill(&batch),
            gas_limit: batch.submission_gas_limit(self.config().batch_gas_multiplier),
            request_ids: request_ids.clone(),
        };
        match self.deps.tx_submitter.submit(tx).await {
            Ok(tx_hash) => {
                info!(
                    job = %self.job.name,
                    tx = %tx_hash,
                    requests = request_ids.len(),
                    total_gas = batch.total_gas_limit,
                    "submitted batch fulfillment"
                );
                self.deps.metrics.batch_submissions.inc();
                for run in &batch.runs {
                    self.mark_consumed(&run.request.log).await;
                    self.deps.metrics.processed_requests.inc();
                }
                Vec::new()
            }
            Err(e) => {
                error!(job = %self.job.name, error = %e, requests = request_ids.len(), "batch submission failed");
                batch.runs.into_iter().map(|run| run.request).collect()
            }
        }
    }

    async fn submit_single(&self, run: FulfillmentRun) -> Option<PendingRequest> {
        let Some(from) = self.next_from_address() else {
            error!(job = %self.job.name, "no from addresses configured");
            return Some(run.request);
        };
        let request_id = run.request_id();
        let tx = TxRequest {
            from,
            to: self.job.coordinator_address,
            payload: encode_fulfill(&run.proof, &run.commitment),
            gas_limit: run.gas_limit,
            request_ids: vec![request_id],
        };
        match self.deps.tx_submitter.submit(tx).await {
            Ok(tx_hash) => {
                info!(job = %self.job.name, tx = %tx_hash, %request_id, "submitted fulfillment");
                self.deps.metrics.single_submissions.inc();
                self.mark_consumed(&run.request.log).await;
                self.deps.metrics.processed_requests.inc();
                None
            }
            Err(e) => {
                error!(job = %self.job.name, error = %e, %request_id, "fulfillment submission failed");
                Some(run.request)
            }
        }
    }

    fn next_from_address(&self) -> Option<Address> {
        let addresses = &self.job.from_addresses;
        if addresses.is_empty() {
            return None;
        }
        let index = self.next_from.fetch_add(1, Ordering::Relaxed);
        Some(addresses[index % addresses.len()])
    }

    async fn mark_consumed(&self, log: &RawLog) {
        if let Err(e) = self.deps.log_broadcaster.mark_consumed(log).await {
            error!(job = %self.job.name, error = %e, tx = %log.tx_hash, "failed to mark log consumed");
        }
    }
}

/// Ready requests keyed by subscription, in ascending subscription order.
fn group_by_subscription(requests: Vec<PendingRequest>) -> BTreeMap<u64, Vec<PendingRequest>> {
    let mut groups: BTreeMap<u64, Vec<PendingRequest>> = BTreeMap::new();
    for request in requests {
        groups.entry(request.request.sub_id).or_default().push(request);
    }
    groups
}

impl LogSink for ListenerState {
    fn handle_log(&self, log: RawLog) {
        if !self.dedup.should_deliver(&log) {
            trace!(job = %self.job.name, block = log.block_number, index = log.log_index, "duplicate log");
            return;
        }
        if let Some(dropped) = self.mailbox.deliver(log) {
            error!(
                job = %self.job.name,
                block = dropped.block_number,
                tx = %dropped.tx_hash,
                "mailbox full, dropped oldest log"
            );
            self.deps.metrics.dropped_mailbox.inc();
        }
    }

    fn on_replay_started(&self) {
        debug!(job = %self.job.name, "log replay started, clearing dedup");
        self.dedup.clear();
    }
}

impl HeadSink for ListenerState {
    fn on_new_head(&self, head: Head) {
        self.latest_head.fetch_max(head.number, Ordering::SeqCst);
        self.head_notify.notify_one();
    }
}
