use sortes_keystore::KeystoreError;
use sortes_vrf::VrfError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to parse log: {0}")]
    LogParse(String),

    #[error("log consumption check failed: {0}")]
    ConsumptionCheck(String),

    #[error("chain query failed: {0}")]
    Chain(String),

    #[error("transaction submission failed: {0}")]
    Submission(String),

    #[error("pipeline run failed: {0}")]
    Pipeline(String),

    #[error("invalid job configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Keystore(#[from] KeystoreError),

    #[error(transparent)]
    Vrf(#[from] VrfError),

    #[error("listener already started")]
    AlreadyStarted,

    #[error("listener not started")]
    NotStarted,
}
