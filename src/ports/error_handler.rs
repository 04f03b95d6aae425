use axum::body::Body;
use http::{Response, request::Parts};

use crate::core::error::RequestError;

/// ErrorHandler renders every request-time failure: malformed paths, misses,
/// field binding, handler, encoding and cleanup errors, and recovered panics.
pub trait ErrorHandler: Send + Sync + 'static {
    fn handle(&self, parts: &Parts, error: &RequestError) -> Response<Body>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&Parts, &RequestError) -> Response<Body> + Send + Sync + 'static,
{
    fn handle(&self, parts: &Parts, error: &RequestError) -> Response<Body> {
        self(parts, error)
    }
}
