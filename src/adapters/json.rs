use axum::body::Body;
use http::{HeaderValue, Response, StatusCode, header, request::Parts};

use crate::{
    core::error::BoxError,
    ports::encoder::{Reply, ResponseEncoder},
};

/// Default response encoder: the handler output as `application/json`
/// with status 200.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResponseEncoder;

impl ResponseEncoder for JsonResponseEncoder {
    fn encode(&self, _parts: &Parts, reply: &dyn Reply) -> Result<Response<Body>, BoxError> {
        let bytes = reply.to_json()?;
        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = StatusCode::OK;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(response)
    }
}
