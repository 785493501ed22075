use serde_json::Value;

use super::channel::ChannelError;

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

/// RPC error types
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Failed to generate request id: {0}")]
    IdGeneration(String),

    #[error("Request id already pending: {0}")]
    DuplicateId(String),

    #[error("RPC error [{code}]: {message}")]
    Remote {
        code: i32,
        message: String,
        data: Option<Value>,
    },
}
