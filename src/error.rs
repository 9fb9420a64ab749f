//! Error types for mail2item.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Work item store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
///
/// A configuration error is fatal to the current cycle of the instance that
/// hit it, never to its siblings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid regex for {key}: {source}")]
    InvalidRegex {
        key: String,
        #[source]
        source: regex::Error,
    },

    #[error("{key} matched but has no '{group}' capture group")]
    MissingCaptureGroup { key: String, group: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail folder errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail folder {path} not found")]
    FolderNotFound { path: PathBuf },

    #[error("Failed to parse message {id}: {reason}")]
    Parse { id: String, reason: String },

    #[error("Message {id} is not in the folder")]
    UnknownMessage { id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message router errors.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("No consumer registered with id {id}")]
    UnknownConsumer { id: u32 },

    #[error("Evaluator failed: {reason}")]
    Evaluator { reason: String },

    #[error("Router state lock poisoned")]
    Poisoned,

    #[error("Mail folder scan failed: {0}")]
    Fetch(#[from] MailError),
}

/// Work item backend errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Work item {id} not found")]
    NotFound { id: u64 },

    #[error("Failed to create work item: {0}")]
    CreateFailed(String),

    #[error("Failed to modify work item {id}: {reason}")]
    ModifyFailed { id: u64, reason: String },

    #[error("Failed to write snapshot: {0}")]
    Snapshot(String),
}

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Work item store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Running instances took more than {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Instance task failed: {0}")]
    Join(String),
}

impl PipelineError {
    /// Whether this error should abort the rest of the instance's cycle.
    pub fn is_fatal_for_cycle(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Routing(_))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
