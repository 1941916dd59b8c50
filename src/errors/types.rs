use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session creation failed: {0}")]
    SessionCreation(String),

    #[error("Navigation timed out: {0}")]
    NavigationTimeout(String),

    #[error("Browser backend crashed: {0}")]
    BackendCrash(String),

    #[error("Interstitial prompt blocked the page: {0}")]
    Interstitial(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
