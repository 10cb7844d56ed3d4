use std::time::Duration;

use thiserror::Error;

/// Target could not be fetched during validation.
#[derive(Debug, Error)]
pub enum ReachabilityError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Timed out after {}s fetching {url}", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },
    #[error("Could not connect to {url}: {message}")]
    Connect { url: String, message: String },
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },
}

/// Reserved for selector resolution once it can fail.
#[derive(Debug, Error)]
#[error("Selector resolution failed: {0}")]
pub struct SelectorResolutionError(pub String);

/// Failure of the optional selector-hint collaborator. Never fails a run.
#[derive(Debug, Error)]
pub enum HintError {
    #[error("No API key configured")]
    MissingKey,
    #[error("Hint request failed: {0}")]
    Request(String),
    #[error("Hint service returned HTTP {0}")]
    Status(u16),
    #[error("Malformed hint response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Any browser-automation failure inside the login driver.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("No {0} selector available for the login form")]
    MissingSelector(&'static str),
    #[error("{step} failed: {message}")]
    Step { step: &'static str, message: String },
    #[error("{step} timed out after {}s", .timeout.as_secs())]
    Timeout { step: &'static str, timeout: Duration },
    #[error("Saving artifact failed: {0}")]
    Storage(#[from] StorageError),
    #[error("Browser automation panicked: {0}")]
    Panicked(String),
}

impl InteractionError {
    pub fn step(step: &'static str, err: anyhow::Error) -> Self {
        Self::Step {
            step,
            message: format!("{:#}", err),
        }
    }
}
