//! Error types for promptloom
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in promptloom
#[derive(Debug, Error)]
pub enum LoomError {
    /// A `<...>` reference whose inner text is not exactly `library.piece`
    #[error("Malformed piece reference: {0}")]
    MalformedReference(String),

    /// Reference names a library that is not loaded
    #[error("Unknown piece library: {0}")]
    UnknownLibrary(String),

    /// Library exists but has no piece with the given name
    #[error("Unknown piece: {0}")]
    UnknownPiece(String),

    /// A piece references itself, directly or through other pieces
    #[error("Cyclic piece reference at {0}")]
    CyclicReference(String),

    /// Dequeue or peek on an empty ring queue
    #[error("Queue is empty")]
    EmptyQueue,

    /// No handler registered for a task type
    #[error("No task handler for type: {0}")]
    UnknownTaskType(String),

    /// External IP changed since the run started
    #[error("IP address changed during run ({previous} -> {current})")]
    IpChanged { previous: String, current: String },

    /// A single task attempt failed
    #[error("Task error: {0}")]
    Task(String),

    /// Generation backend failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Piece library could not be loaded
    #[error("Library error: {0}")]
    Library(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LoomError {
    /// True for errors raised while expanding piece references.
    ///
    /// These are never retried and must reach the caller before anything is enqueued.
    pub fn is_template_error(&self) -> bool {
        matches!(
            self,
            LoomError::MalformedReference(_)
                | LoomError::UnknownLibrary(_)
                | LoomError::UnknownPiece(_)
                | LoomError::CyclicReference(_)
        )
    }

    /// True for the IP-change condition that stops a run without retrying.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, LoomError::IpChanged { .. })
    }
}

/// Result type alias for promptloom operations
pub type Result<T> = std::result::Result<T, LoomError>;
