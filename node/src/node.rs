//! The oracle node: wires the key store, metrics and listeners together.

use std::sync::Arc;
use std::time::Duration;

use sortes_crypto::PublicKey;
use sortes_keystore::{FileBackend, KeyBackend, KeystoreError, UnlockOutcome, VrfKeyStore};
use sortes_listener::{
    CoordinatorReader, HeadBroadcaster, KeyStorePipeline, ListenerDeps, ListenerMetrics,
    LogBroadcaster, RequestListener, TxSubmitter,
};
use sortes_types::Clock;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::shutdown::ShutdownController;

/// Maximum time to wait for each listener's tasks on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The chain-facing clients every listener shares.
#[derive(Clone)]
pub struct ChainClients {
    pub log_broadcaster: Arc<dyn LogBroadcaster>,
    pub head_broadcaster: Arc<dyn HeadBroadcaster>,
    pub coordinator: Arc<dyn CoordinatorReader>,
    pub tx_submitter: Arc<dyn TxSubmitter>,
    pub clock: Arc<dyn Clock>,
}

pub struct OracleNode {
    config: NodeConfig,
    keystore: Arc<VrfKeyStore>,
    chain: ChainClients,
    metrics: ListenerMetrics,
    listeners: Vec<RequestListener>,
    running: bool,
    shutdown: Arc<ShutdownController>,
}

impl OracleNode {
    /// Build a node whose keys live in `config.keystore_dir`.
    pub fn new(config: NodeConfig, chain: ChainClients) -> Result<Self, NodeError> {
        let backend = FileBackend::open(&config.keystore_dir)?;
        Self::with_backend(config, Arc::new(backend), chain)
    }

    /// Build a node over an explicit key backend.
    pub fn with_backend(
        config: NodeConfig,
        backend: Arc<dyn KeyBackend>,
        chain: ChainClients,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let keystore = Arc::new(VrfKeyStore::new(backend, config.kdf));
        Ok(Self {
            keystore,
            chain,
            metrics: ListenerMetrics::new()?,
            listeners: Vec::new(),
            running: false,
            shutdown: Arc::new(ShutdownController::new()),
            config,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn keystore(&self) -> &Arc<VrfKeyStore> {
        &self.keystore
    }

    /// Handle for triggering shutdown from outside [`run`](Self::run).
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Unlock every stored key that decrypts with `passphrase`.
    pub fn unlock(&self, passphrase: &str) -> Result<UnlockOutcome, NodeError> {
        let outcome = self.keystore.unlock(passphrase)?;
        tracing::info!(
            unlocked = outcome.unlocked.len(),
            failed = outcome.failures.len(),
            "VRF keys unlocked"
        );
        Ok(outcome)
    }

    /// Start one listener per job. Every job's key must already be unlocked.
    pub fn start(&mut self) -> Result<(), NodeError> {
        if self.is_running() {
            return Err(NodeError::AlreadyRunning);
        }
        let locked: Vec<PublicKey> = self
            .config
            .jobs
            .iter()
            .map(|job| job.public_key)
            .filter(|pk| !self.keystore.is_unlocked(pk))
            .collect();
        if let Some(public_key) = locked.first() {
            return Err(KeystoreError::KeyNotUnlocked(*public_key).into());
        }

        tracing::info!(jobs = self.config.jobs.len(), "oracle node starting");
        let mut listeners = Vec::with_capacity(self.config.jobs.len());
        for job in &self.config.jobs {
            let pipeline = KeyStorePipeline::new(
                Arc::clone(&self.keystore),
                job.public_key,
                job.listener.proof_verification_gas,
            );
            let deps = ListenerDeps {
                log_broadcaster: Arc::clone(&self.chain.log_broadcaster),
                head_broadcaster: Arc::clone(&self.chain.head_broadcaster),
                coordinator: Arc::clone(&self.chain.coordinator),
                tx_submitter: Arc::clone(&self.chain.tx_submitter),
                pipeline: Arc::new(pipeline),
                clock: Arc::clone(&self.chain.clock),
                metrics: self.metrics.for_job(&job.name),
            };
            listeners.push(RequestListener::new(job.clone(), deps)?);
        }
        // Nothing is spawned until every listener has been built.
        for listener in &listeners {
            listener.start()?;
        }
        self.listeners = listeners;
        self.running = true;
        tracing::info!("oracle node started");
        Ok(())
    }

    /// Stop every listener, waiting up to a fixed timeout for each.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        if !self.is_running() {
            return Err(NodeError::NotRunning);
        }
        tracing::info!("oracle node stopping");
        self.shutdown.shutdown();

        let mut timed_out = false;
        for listener in self.listeners.drain(..) {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, listener.stop()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(job = %listener.job().name, error = %e, "listener stop failed");
                }
                Err(_) => {
                    tracing::warn!(
                        job = %listener.job().name,
                        "shutdown timeout ({:?}), listener tasks may still be running",
                        SHUTDOWN_TIMEOUT
                    );
                    timed_out = true;
                }
            }
        }
        self.running = false;
        tracing::info!("oracle node stopped");
        if timed_out {
            Err(NodeError::ShutdownTimeout)
        } else {
            Ok(())
        }
    }

    /// Start, run until SIGINT/SIGTERM or a programmatic shutdown, then stop.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        self.start()?;
        self.shutdown.wait_for_signal().await;
        self.stop().await
    }

    pub fn listeners(&self) -> &[RequestListener] {
        &self.listeners
    }

    /// Prometheus text exposition of every listener metric, or `None` when
    /// metrics are disabled.
    pub fn metrics_text(&self) -> Result<Option<String>, NodeError> {
        if !self.config.enable_metrics {
            return Ok(None);
        }
        Ok(Some(self.metrics.encode()?))
    }
}
