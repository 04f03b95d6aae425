use std::any::Any;

use http::StatusCode;
use thiserror::Error;

use crate::utils::path::PathError;

/// Boxed error type used at the field, handler, encoder and cleanup seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while assembling a router. They abort construction.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RegistrationError {
    #[error("field {field} is not exported")]
    UnexportedField { field: String },

    #[error("no option for field {field} type {type_name}")]
    UnboundField {
        field: String,
        type_name: &'static str,
    },

    #[error("option for field {field} expects type {expected}, field has type {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("field {field} reserves a path segment after a remainder")]
    PathAfterRemainder { field: String },

    #[error("compiling option for field {field}: {source}")]
    Option { field: String, source: BoxError },
}

/// A panic recovered from a field modifier, handler, encoder or cleanup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("panic: {message}")]
pub struct Panicked {
    pub message: String,
}

impl Panicked {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self { message }
    }
}

/// Errors raised while serving a single request.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RequestError {
    #[error("malformed path: {0}")]
    MalformedPath(#[from] PathError),

    #[error("not found")]
    NotFound,

    #[error("reading request body: {0}")]
    Body(#[source] BoxError),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("applying input option for field {field}: {source}")]
    Field { field: &'static str, source: BoxError },

    #[error("handling request: {0}")]
    Handler(#[source] BoxError),

    #[error("encoding response: {0}")]
    Encode(#[source] BoxError),

    #[error(transparent)]
    Panic(#[from] Panicked),

    #[error("releasing request resources: {0}")]
    Cleanup(#[source] BoxError),
}

impl RequestError {
    /// Status code the default error handling associates with this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::MalformedPath(_) | RequestError::Body(_) => StatusCode::BAD_REQUEST,
            RequestError::NotFound => StatusCode::NOT_FOUND,
            RequestError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::MalformedPath(_) => "malformed_path",
            RequestError::NotFound => "not_found",
            RequestError::Body(_) => "body",
            RequestError::BodyTooLarge { .. } => "body_too_large",
            RequestError::Field { .. } => "field",
            RequestError::Handler(_) => "handler",
            RequestError::Encode(_) => "encode",
            RequestError::Panic(_) => "panic",
            RequestError::Cleanup(_) => "cleanup",
        }
    }
}
