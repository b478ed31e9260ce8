//! Error types for the bridge agent

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// No selector strategy produced a value
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The page did not yield what an action needs
    #[error("{0}")]
    Validation(String),

    /// The operator declined a confirmation or closed the composer
    #[error("cancelled by operator")]
    Cancelled,

    /// The request never produced a response
    #[error("{0}")]
    Transport(String),

    /// The service answered but refused the action
    #[error("{0}")]
    Rejected(String),

    /// DevTools or in-page script failure
    #[error("page error: {0}")]
    Page(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

impl BridgeError {
    pub fn page(err: impl std::fmt::Display) -> Self {
        BridgeError::Page(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
