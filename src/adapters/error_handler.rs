use axum::body::Body;
use http::{HeaderValue, Response, header, request::Parts};

use crate::{core::error::RequestError, ports::error_handler::ErrorHandler};

/// Default error handler: the error text as `text/plain`.
///
/// The status follows [`RequestError::status_code`], so path decoding
/// failures answer 400, misses 404, oversized bodies 413 and everything
/// else 500.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextErrorHandler;

impl ErrorHandler for PlainTextErrorHandler {
    fn handle(&self, _parts: &Parts, error: &RequestError) -> Response<Body> {
        let mut response = Response::new(Body::from(error.to_string()));
        *response.status_mut() = error.status_code();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use http_body_util::BodyExt;

    use super::*;

    #[tokio::test]
    async fn test_writes_error_text() {
        let (parts, ()) = http::Request::builder()
            .uri("/x")
            .body(())
            .unwrap()
            .into_parts();
        let err = RequestError::Handler("database unavailable".into());

        let response = PlainTextErrorHandler.handle(&parts, &err);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"handling request: database unavailable");
    }

    #[test]
    fn test_not_found_status() {
        let (parts, ()) = http::Request::builder()
            .uri("/x")
            .body(())
            .unwrap()
            .into_parts();
        let response = PlainTextErrorHandler.handle(&parts, &RequestError::NotFound);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
