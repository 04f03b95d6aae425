use std::any::Any;

use axum::body::Body;
use http::{Response, request::Parts};
use serde::Serialize;

use crate::core::error::BoxError;

/// A handler output on its way to the response encoder.
///
/// Implemented for every `Serialize + Send + 'static` type, so handlers
/// return their own types and encoders either serialize them generically or
/// downcast through [`Reply::as_any`] for type-specific rendering.
pub trait Reply: Send + 'static {
    /// Serialize the output as JSON.
    fn to_json(&self) -> serde_json::Result<Vec<u8>>;

    fn as_any(&self) -> &dyn Any;

    fn type_name(&self) -> &'static str;
}

impl<T: Serialize + Send + 'static> Reply for T {
    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// ResponseEncoder turns a successful handler output into a response.
pub trait ResponseEncoder: Send + Sync + 'static {
    /// Encode `reply` for the request described by `parts`.
    ///
    /// # Errors
    /// An encoding failure is routed to the router's error handler.
    fn encode(&self, parts: &Parts, reply: &dyn Reply) -> Result<Response<Body>, BoxError>;
}

impl<F> ResponseEncoder for F
where
    F: Fn(&Parts, &dyn Reply) -> Result<Response<Body>, BoxError> + Send + Sync + 'static,
{
    fn encode(&self, parts: &Parts, reply: &dyn Reply) -> Result<Response<Body>, BoxError> {
        self(parts, reply)
    }
}
