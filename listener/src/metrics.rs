//! Prometheus metrics for request listeners.
//!
//! One [`ListenerMetrics`] owns the registry; every metric carries a `job`
//! label and each listener works with the [`JobMetrics`] children for its
//! own job.

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, Encoder, Histogram, HistogramOpts, HistogramVec,
    IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

pub struct ListenerMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Requests dropped, by reason: `mailbox` or `age`.
    dropped_requests: IntCounterVec,
    /// Requests seen again after a recorded fulfillment.
    duplicate_requests: IntCounterVec,
    processed_requests: IntCounterVec,
    /// Requests skipped because the coordinator reported them fulfilled.
    skipped_fulfilled: IntCounterVec,
    transactions_submitted: IntCounterVec,
    /// Requests left pending because their subscription could not pay.
    underfunded_requests: IntCounterVec,

    // ── Gauges ──────────────────────────────────────────────────────────
    pending_requests: IntGaugeVec,

    // ── Histograms ──────────────────────────────────────────────────────
    proof_generation_ms: HistogramVec,
}

impl ListenerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let dropped_requests = register_int_counter_vec_with_registry!(
            Opts::new("sortes_dropped_requests_total", "Requests dropped without fulfillment"),
            &["job", "reason"],
            registry
        )?;
        let duplicate_requests = register_int_counter_vec_with_registry!(
            Opts::new(
                "sortes_duplicate_requests_total",
                "Requests seen again after being fulfilled"
            ),
            &["job"],
            registry
        )?;
        let processed_requests = register_int_counter_vec_with_registry!(
            Opts::new("sortes_processed_requests_total", "Requests fulfilled or retired"),
            &["job"],
            registry
        )?;
        let skipped_fulfilled = register_int_counter_vec_with_registry!(
            Opts::new(
                "sortes_skipped_fulfilled_total",
                "Requests skipped because they were already fulfilled"
            ),
            &["job"],
            registry
        )?;
        let transactions_submitted = register_int_counter_vec_with_registry!(
            Opts::new(
                "sortes_transactions_submitted_total",
                "Fulfillment transactions handed to the submitter"
            ),
            &["job", "kind"],
            registry
        )?;
        let underfunded_requests = register_int_counter_vec_with_registry!(
            Opts::new(
                "sortes_underfunded_requests_total",
                "Confirmed requests deferred because the subscription balance was too low"
            ),
            &["job"],
            registry
        )?;
        let pending_requests = register_int_gauge_vec_with_registry!(
            Opts::new("sortes_pending_requests", "Unique request ids awaiting confirmation or retry"),
            &["job"],
            registry
        )?;
        // 1 ms to ~16 s.
        let proof_generation_ms = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "sortes_proof_generation_ms",
                "Time to generate one fulfillment proof, in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 15)?),
            &["job"],
            registry
        )?;

        Ok(Self {
            registry,
            dropped_requests,
            duplicate_requests,
            processed_requests,
            skipped_fulfilled,
            transactions_submitted,
            underfunded_requests,
            pending_requests,
            proof_generation_ms,
        })
    }

    /// Metric children labelled for one job.
    pub fn for_job(&self, job: &str) -> JobMetrics {
        JobMetrics {
            dropped_mailbox: self.dropped_requests.with_label_values(&[job, "mailbox"]),
            dropped_age: self.dropped_requests.with_label_values(&[job, "age"]),
            duplicate_requests: self.duplicate_requests.with_label_values(&[job]),
            processed_requests: self.processed_requests.with_label_values(&[job]),
            skipped_fulfilled: self.skipped_fulfilled.with_label_values(&[job]),
            single_submissions: self.transactions_submitted.with_label_values(&[job, "single"]),
            batch_submissions: self.transactions_submitted.with_label_values(&[job, "batch"]),
            underfunded_requests: self.underfunded_requests.with_label_values(&[job]),
            pending_requests: self.pending_requests.with_label_values(&[job]),
            proof_generation_ms: self.proof_generation_ms.with_label_values(&[job]),
        }
    }

    /// Render the registry in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[derive(Clone)]
pub struct JobMetrics {
    pub dropped_mailbox: IntCounter,
    pub dropped_age: IntCounter,
    pub duplicate_requests: IntCounter,
    pub processed_requests: IntCounter,
    pub skipped_fulfilled: IntCounter,
    pub single_submissions: IntCounter,
    pub batch_submissions: IntCounter,
    pub underfunded_requests: IntCounter,
    pub pending_requests: IntGauge,
    pub proof_generation_ms: Histogram,
}
