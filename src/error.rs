use thiserror::Error;

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

/// Error types for the operation queue
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    /// Invalid enqueue or batch options
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Operation exceeded its timeout
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Transient failure (network, quota, and similar)
    #[error("Transient error: {message}")]
    Transient { message: String },

    /// Permanent failure, never retried
    #[error("Terminal error: {message}")]
    Terminal { message: String },

    /// Operation was cancelled while still queued
    #[error("Operation cancelled before admission")]
    Cancelled,

    /// Operation was still pending when the queue shut down
    #[error("Queue shut down with operation pending")]
    Shutdown,
}

impl QueueError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create a transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a terminal error
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            message: message.into(),
        }
    }

    /// Check if this error is retryable under the default classification
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transient { .. })
    }

    /// Get error category for history entries and diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Timeout { .. } => "timeout",
            Self::Transient { .. } => "transient",
            Self::Terminal { .. } => "terminal",
            Self::Cancelled => "cancelled",
            Self::Shutdown => "shutdown",
        }
    }
}
