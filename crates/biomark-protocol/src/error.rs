//! Error taxonomy for action-group handlers.

use thiserror::Error;

use crate::decode::DecodeError;

/// Failures from external collaborators (object storage, the query engine,
/// the model endpoint, the workflow trigger, the literature API).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("query {id} failed: {reason}")]
    QueryFailed { id: String, reason: String },
    #[error("query {id} was cancelled")]
    QueryCancelled { id: String },
    #[error("{service} request failed: {message}")]
    Request { service: String, message: String },
    #[error("{service} returned an unexpected response: {message}")]
    Response { service: String, message: String },
}

impl ServiceError {
    pub fn request(service: impl Into<String>, message: impl ToString) -> Self {
        Self::Request {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn response(service: impl Into<String>, message: impl ToString) -> Self {
        Self::Response {
            service: service.into(),
            message: message.to_string(),
        }
    }
}

/// Anything a handler can fail with. Every variant renders as a
/// human-readable message; the envelope builder maps the variant to the
/// platform-facing status.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("{action_group}::{operation} is not a valid operation, try another one")]
    UnrecognizedOperation {
        action_group: String,
        operation: String,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl HandlerError {
    pub fn unrecognized(action_group: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnrecognizedOperation {
            action_group: action_group.into(),
            operation: operation.into(),
        }
    }

    /// Status code for path-style envelopes: only an unknown operation is a
    /// caller error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnrecognizedOperation { .. } => 400,
            _ => 500,
        }
    }
}

pub type HandlerResult<T> = Result<T, HandlerError>;
