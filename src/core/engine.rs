//! Request execution for one registered route.
//!
//! An [`Endpoint`] owns the compiled fields of its input type and the
//! type-erased handler. Serving a request buffers the body, populates a
//! fresh input field by field, invokes the handler (skipped for HEAD),
//! encodes the output and finally unwinds every cleanup acquired on the
//! way against the request's terminal error.
use std::{
    convert::Infallible,
    fmt,
    future::Future,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, OnceLock},
    task::{Context, Poll},
};

use axum::body::Body;
use bytes::Bytes;
use futures_util::{FutureExt, future::BoxFuture};
use http::{Method, Request, Response, StatusCode, request::Parts};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tower::{Service, util::BoxCloneSyncService};

use crate::{
    adapters::{JsonResponseEncoder, PlainTextErrorHandler},
    config::DEFAULT_BODY_LIMIT_BYTES,
    core::{
        error::{BoxError, Panicked, RequestError},
        modifier::CleanupStack,
        registry::CompiledField,
        route::RequestContext,
        schema::Input,
    },
    ports::{ErrorHandler, Reply, ResponseEncoder},
    utils::path::split_path,
};

/// The service bound at a trie node: a route endpoint wrapped in whatever
/// middleware was configured before the route registered.
pub type RouteService = BoxCloneSyncService<Request<Body>, Response<Body>, Infallible>;

pub(crate) type HandlerFn<I> =
    Arc<dyn Fn(I) -> BoxFuture<'static, Result<Box<dyn Reply>, BoxError>> + Send + Sync>;

/// Router-wide collaborators, fixed when the router is built.
pub(crate) struct Settings {
    pub(crate) encoder: Arc<dyn ResponseEncoder>,
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
    pub(crate) body_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            encoder: Arc::new(JsonResponseEncoder),
            error_handler: Arc::new(PlainTextErrorHandler),
            body_limit: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Render `error` through the error handler, recovering a panicking
    /// handler with a bare 500.
    pub(crate) fn render_error(&self, parts: &Parts, error: &RequestError) -> Response<Body> {
        let status = error.status_code();
        if status.is_server_error() {
            tracing::error!(error = %error, kind = error.kind(), "request failed");
        } else {
            tracing::debug!(error = %error, kind = error.kind(), "request rejected");
        }
        match catch_unwind(AssertUnwindSafe(|| self.error_handler.handle(parts, error))) {
            Ok(response) => response,
            Err(payload) => {
                let panicked = Panicked::from_payload(payload);
                tracing::error!(error = %panicked, "error handler panicked");
                status_only(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// Answer a request that never reached a route: a path that does not decode
/// (400) or matches nothing (404). The configured error handler is bypassed
/// so these statuses are fixed.
pub(crate) fn reject(parts: &Parts, error: &RequestError) -> Response<Body> {
    tracing::debug!(error = %error, kind = error.kind(), "request not routed");
    PlainTextErrorHandler.handle(parts, error)
}

pub(crate) type SharedSettings = Arc<OnceLock<Settings>>;

/// Decoded path segments computed by the router during lookup.
#[derive(Debug, Clone)]
pub(crate) struct PathSegments(pub(crate) Vec<String>);

pub(crate) fn status_only(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// A compiled route ready to serve requests.
pub(crate) struct Endpoint<I> {
    fields: Arc<[CompiledField<I>]>,
    handler: HandlerFn<I>,
    settings: SharedSettings,
}

impl<I> Clone for Endpoint<I> {
    fn clone(&self) -> Self {
        Self {
            fields: Arc::clone(&self.fields),
            handler: Arc::clone(&self.handler),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<I: Input> Endpoint<I> {
    pub(crate) fn new(
        fields: Vec<CompiledField<I>>,
        handler: HandlerFn<I>,
        settings: SharedSettings,
    ) -> Self {
        Self {
            fields: fields.into(),
            handler,
            settings,
        }
    }

    async fn serve(self, req: Request<Body>) -> Response<Body> {
        let settings = self.settings.get_or_init(Settings::default);
        let (mut parts, body) = req.into_parts();

        let segments = match parts.extensions.remove::<PathSegments>() {
            Some(PathSegments(segments)) => segments,
            None => match split_path(parts.uri.path()) {
                Ok(segments) => segments,
                Err(err) => return reject(&parts, &err.into()),
            },
        };

        let body = match read_body(body, settings.body_limit).await {
            Ok(body) => body,
            Err(err) => return settings.render_error(&parts, &err),
        };

        let mut ctx = RequestContext::new(parts, body, segments);
        let mut cleanups = CleanupStack::new();
        let mut terminal = None;
        let mut input = I::default();

        for field in self.fields.iter() {
            let slot = field.def.slot(&mut input);
            match (field.modifier)(&mut ctx, slot) {
                Ok(Some(closer)) => cleanups.push(closer),
                Ok(None) => {}
                Err(source) => {
                    terminal = Some(RequestError::Field {
                        field: field.def.name(),
                        source,
                    });
                    break;
                }
            }
        }

        let mut response = None;
        if terminal.is_none() && ctx.method() != Method::HEAD {
            match self.invoke(input).await {
                Ok(reply) => match encode(settings, ctx.parts(), &*reply) {
                    Ok(encoded) => response = Some(encoded),
                    Err(err) => terminal = Some(err),
                },
                Err(err) => terminal = Some(err),
            }
        }

        cleanups.unwind(&mut terminal);

        let parts = ctx.into_parts();
        match terminal {
            Some(err) => settings.render_error(&parts, &err),
            None => response.unwrap_or_else(|| status_only(StatusCode::OK)),
        }
    }

    async fn invoke(&self, input: I) -> Result<Box<dyn Reply>, RequestError> {
        let handler = Arc::clone(&self.handler);
        match AssertUnwindSafe(async move { handler(input).await })
            .catch_unwind()
            .await
        {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => Err(RequestError::Handler(err)),
            Err(payload) => Err(Panicked::from_payload(payload).into()),
        }
    }
}

fn encode(
    settings: &Settings,
    parts: &Parts,
    reply: &dyn Reply,
) -> Result<Response<Body>, RequestError> {
    match catch_unwind(AssertUnwindSafe(|| settings.encoder.encode(parts, reply))) {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(err)) => Err(RequestError::Encode(err)),
        Err(payload) => Err(Panicked::from_payload(payload).into()),
    }
}

async fn read_body(body: Body, limit: usize) -> Result<Bytes, RequestError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.is::<LengthLimitError>() => Err(RequestError::BodyTooLarge { limit }),
        Err(err) => Err(RequestError::Body(err)),
    }
}

impl<I: Input> Service<Request<Body>> for Endpoint<I> {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let endpoint = self.clone();
        Box::pin(async move { Ok(endpoint.serve(req).await) })
    }
}

/// Erase a typed async handler.
pub(crate) fn erase_handler<I, O, E, F, Fut>(handler: F) -> HandlerFn<I>
where
    I: Input,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Reply,
    E: Into<BoxError> + 'static,
{
    Arc::new(move |input: I| {
        let fut = handler(input);
        async move {
            match fut.await {
                Ok(output) => Ok(Box::new(output) as Box<dyn Reply>),
                Err(err) => Err(err.into()),
            }
        }
        .boxed()
    })
}
