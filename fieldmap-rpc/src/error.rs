//! RPC-specific error types.

use fieldmap_core::MappingError;
use serde_json::{Value, json};

/// Errors that can occur while serving engine requests.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("JSON-RPC parse error: {message}")]
    ParseError { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },

    #[error("Mapping rejected: {0}")]
    Mapping(#[from] MappingError),

    #[error("Transport error: {message}")]
    TransportError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcError {
    /// Convert to a JSON-RPC error code.
    pub fn error_code(&self) -> i64 {
        match self {
            RpcError::ParseError { .. } => -32700,
            RpcError::InvalidRequest { .. } => -32600,
            RpcError::MethodNotFound { .. } => -32601,
            RpcError::InvalidParams { .. } => -32602,
            RpcError::InternalError { .. } => -32603,
            RpcError::Mapping(_) => -32010,
            RpcError::TransportError { .. } => -32002,
            RpcError::Io(_) => -32603,
            RpcError::Json(_) => -32700,
        }
    }

    /// Structured detail for the `data` member of a JSON-RPC error, if any.
    pub fn data(&self) -> Option<Value> {
        match self {
            RpcError::Mapping(err) => Some(json!({ "code": err.code() })),
            _ => None,
        }
    }
}
