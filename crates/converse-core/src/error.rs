// Error types for the conversation engine

use thiserror::Error;

/// Result type alias for conversation operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors that can occur while driving a chat exchange
///
/// Every variant is local to one `chat` invocation: the failed step's
/// content is never committed to history and the conversation remains
/// usable afterwards. Nothing is retried automatically.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    /// The provider failed before the backend began streaming
    /// (request encoding, connect failure, non-success HTTP status)
    #[error("provider request failed: {0}")]
    Provider(String),

    /// A malformed incremental record or a transport failure mid-stream
    #[error("error decoding stream: {0}")]
    Decode(String),

    /// The backend reported a completion reason other than an ordinary
    /// stop or a stop to call tools
    #[error("unexpected stop reason: {0:?}")]
    UnexpectedStop(String),

    /// The backend requested a tool that is not in the registry
    #[error("tool {0:?} not found")]
    UnknownTool(String),

    /// The chat was cancelled through its cancellation token
    #[error("chat cancelled")]
    Cancelled,
}

impl ChatError {
    /// Create a provider setup error
    pub fn provider(msg: impl Into<String>) -> Self {
        ChatError::Provider(msg.into())
    }

    /// Create a stream decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        ChatError::Decode(msg.into())
    }
}
