use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("keystore error: {0}")]
    Keystore(#[from] sortes_keystore::KeystoreError),

    #[error("listener error: {0}")]
    Listener(#[from] sortes_listener::ListenerError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("logging error: {0}")]
    Logging(String),

    #[error("node already running")]
    AlreadyRunning,

    #[error("node not running")]
    NotRunning,

    #[error("shutdown timeout")]
    ShutdownTimeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
