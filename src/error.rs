//! Engine error types — JSON-RPC error codes used by the A2A service layer.
//!
//! The external surface only ever emits three JSON-RPC codes: `-32600`
//! invalid request, `-32602` invalid params, `-32000` internal. Note
//! `-32000` here, not the JSON-RPC-standard `-32603` — this engine's
//! internal-failure code is deliberately distinct from the generic one.

use crate::types::JsonRpcError;

/// The JSON sent is not a valid JSON-RPC 2.0 request object.
pub const INVALID_REQUEST: i64 = -32600;

/// Method parameters failed validation.
pub const INVALID_PARAMS: i64 = -32602;

/// An internal failure occurred while handling the request.
pub const INTERNAL_ERROR: i64 = -32000;

/// Unified error type for the engine's JSON-RPC surface.
#[derive(Debug, Clone, thiserror::Error)]
pub enum A2AError {
    /// Malformed JSON-RPC envelope (missing `jsonrpc`/`id`/`method`/`params`).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Well-formed envelope, but `params` fails method-specific validation.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Internal failure — store inconsistency, unexpected worker behavior, etc.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The referenced task does not exist (mapped to HTTP 404 by callers).
    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

pub type A2AResult<T> = Result<T, A2AError>;

impl A2AError {
    pub fn code(&self) -> i64 {
        match self {
            A2AError::InvalidRequest(_) => INVALID_REQUEST,
            A2AError::InvalidParams(_) => INVALID_PARAMS,
            A2AError::Internal(_) => INTERNAL_ERROR,
            // Not part of the JSON-RPC error taxonomy; only reached via the
            // plain-HTTP GET endpoints, which map it to a 404 instead.
            A2AError::TaskNotFound(_) => INTERNAL_ERROR,
        }
    }
}

impl From<A2AError> for JsonRpcError {
    fn from(err: A2AError) -> Self {
        JsonRpcError {
            code: err.code(),
            message: err.to_string(),
            data: None,
        }
    }
}
