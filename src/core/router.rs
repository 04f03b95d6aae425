//! Router assembly and dispatch.
//!
//! A [`Router`] is built once from an ordered list of [`RouterOption`]s and
//! is read-only afterwards. Options register field bindings, routes and
//! router-wide collaborators; the first failing option aborts construction
//! and nothing applied before it is rolled back. The finished router is a
//! cloneable `tower::Service`.
use std::{
    any::{Any, type_name},
    convert::Infallible,
    fmt,
    future::Future,
    sync::Arc,
    task::{Context, Poll},
};

use axum::body::Body;
use futures_util::future::BoxFuture;
use http::{Method, Request, Response};
use tower::{Layer, Service, ServiceExt};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    adapters::{JsonResponseEncoder, PlainTextErrorHandler},
    config::DEFAULT_BODY_LIMIT_BYTES,
    core::{
        engine::{
            Endpoint, HandlerFn, PathSegments, RouteService, Settings, SharedSettings,
            erase_handler, reject,
        },
        error::{BoxError, RegistrationError, RequestError},
        modifier::FieldOption,
        node::MethodRoots,
        options::path_by_name,
        registry::{FieldRegistry, erase},
        route::Route,
        schema::{Fixed, Input, TypeTag},
    },
    metrics::{RequestTimer, increment_request_total},
    ports::{ErrorHandler, Reply, ResponseEncoder},
    tracing_setup::{create_registration_span, create_request_span},
    utils::path::split_path,
};

type Wrap = Arc<dyn Fn(RouteService) -> RouteService + Send + Sync>;

/// Identifier assigned to every request the router answers, available to
/// middleware and field options through the request extensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mutable router under construction.
pub(crate) struct RouterState {
    roots: MethodRoots<RouteService>,
    registry: FieldRegistry,
    encoder: Option<Arc<dyn ResponseEncoder>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    body_limit: usize,
    middleware: Vec<Wrap>,
    settings: SharedSettings,
}

impl RouterState {
    fn new() -> Self {
        Self {
            roots: MethodRoots::new(),
            registry: FieldRegistry::default(),
            encoder: None,
            error_handler: None,
            body_limit: DEFAULT_BODY_LIMIT_BYTES,
            middleware: Vec::new(),
            settings: SharedSettings::default(),
        }
    }

    fn register<I: Input>(
        &mut self,
        method: Method,
        handler: HandlerFn<I>,
    ) -> Result<(), RegistrationError> {
        let span = create_registration_span(method.as_str(), type_name::<I>());
        let _enter = span.enter();

        let mut route = Route::new();
        let fields = self.registry.compile_input::<I>(&mut route)?;

        let endpoint = Endpoint::new(fields, handler, Arc::clone(&self.settings));
        let mut service = RouteService::new(endpoint);
        for wrap in &self.middleware {
            service = wrap(service);
        }

        let Some(root) = self.roots.root_mut(&method) else {
            tracing::warn!(method = %method, route = %route, "method is never routed, route ignored");
            return Ok(());
        };
        if route.install(root, service).is_some() {
            tracing::warn!(method = %method, route = %route, "route replaced an earlier registration");
        }
        tracing::debug!(method = %method, route = %route, "route registered");
        Ok(())
    }

    fn freeze(self) -> Router {
        let settings = Settings {
            encoder: self
                .encoder
                .unwrap_or_else(|| Arc::new(JsonResponseEncoder)),
            error_handler: self
                .error_handler
                .unwrap_or_else(|| Arc::new(PlainTextErrorHandler)),
            body_limit: self.body_limit,
        };
        if self.settings.set(settings).is_err() {
            tracing::warn!("router settings were initialized before the router was built");
        }
        Router {
            inner: Arc::new(RouterInner {
                roots: self.roots,
                settings: self.settings,
            }),
        }
    }
}

/// One step of router assembly.
pub struct RouterOption(Box<dyn FnOnce(&mut RouterState) -> Result<(), RegistrationError> + Send>);

impl RouterOption {
    fn new<F>(apply: F) -> Self
    where
        F: FnOnce(&mut RouterState) -> Result<(), RegistrationError> + Send + 'static,
    {
        Self(Box::new(apply))
    }

    fn apply(self, state: &mut RouterState) -> Result<(), RegistrationError> {
        (self.0)(state)
    }
}

impl fmt::Debug for RouterOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RouterOption")
    }
}

struct RouterInner {
    roots: MethodRoots<RouteService>,
    settings: SharedSettings,
}

impl RouterInner {
    fn settings(&self) -> &Settings {
        self.settings.get_or_init(Settings::default)
    }
}

/// A frozen, shareable router.
///
/// ```
/// use fieldroute::{Fields, Input, Router, router};
///
/// #[derive(Default)]
/// struct Hello {
///     name: String,
/// }
///
/// impl Input for Hello {
///     fn fields() -> Fields<Self> {
///         Fields::new().field("name", |h: &mut Self| &mut h.name)
///     }
/// }
///
/// let router = Router::new([
///     router::by_type([fieldroute::string_path_ids()]),
///     router::get(|h: Hello| async move {
///         Ok::<_, fieldroute::BoxError>(format!("Hello {}", h.name))
///     }),
/// ])?;
/// # let _ = router;
/// # Ok::<(), fieldroute::RegistrationError>(())
/// ```
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("settings", self.inner.settings())
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Apply `options` in order and freeze the result.
    ///
    /// # Errors
    /// Returns the first option's error. Options applied before it are not
    /// rolled back; the partially assembled router is dropped.
    pub fn new(options: impl IntoIterator<Item = RouterOption>) -> Result<Self, RegistrationError> {
        let mut state = RouterState::new();
        for option in options {
            option.apply(&mut state)?;
        }
        Ok(state.freeze())
    }

    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Serve one request.
    pub async fn handle(&self, mut req: Request<Body>) -> Response<Body> {
        let request_id = RequestId::new();
        let method = req.method().clone();
        let span = create_request_span(method.as_str(), req.uri().path(), request_id.as_str());
        let timer = RequestTimer::new(method.as_str());
        req.extensions_mut().insert(request_id);

        let response = self.dispatch(req).instrument(span.clone()).await;

        let status = response.status().as_u16();
        span.record("http.status_code", status);
        span.record("duration_ms", timer.elapsed().as_millis() as u64);
        increment_request_total(method.as_str(), status);
        span.in_scope(|| tracing::debug!(status, "request completed"));
        response
    }

    async fn dispatch(&self, mut req: Request<Body>) -> Response<Body> {
        let mut segments = match split_path(req.uri().path()) {
            Ok(segments) => segments,
            Err(err) => {
                let (parts, _) = req.into_parts();
                return reject(&parts, &err.into());
            }
        };

        let mut found = self.inner.roots.lookup(req.method(), &segments).cloned();
        // `/` is also how an empty path goes over the wire, so it falls back
        // to the routes bound at the root itself.
        if found.is_none() && is_bare_root(&segments) {
            found = self
                .inner
                .roots
                .lookup::<String>(req.method(), &[])
                .cloned();
            if found.is_some() {
                segments.clear();
            }
        }
        let Some(service) = found else {
            let (parts, _) = req.into_parts();
            return reject(&parts, &RequestError::NotFound);
        };

        req.extensions_mut().insert(PathSegments(segments));
        match service.oneshot(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }
}

fn is_bare_root(segments: &[String]) -> bool {
    matches!(segments, [only] if only.is_empty())
}

impl Service<Request<Body>> for Router {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let router = self.clone();
        Box::pin(async move { Ok(router.handle(req).await) })
    }
}

/// Collects options through named setters; [`RouterBuilder::build`] applies
/// them exactly like [`Router::new`].
#[derive(Debug, Default)]
pub struct RouterBuilder {
    options: Vec<RouterOption>,
}

impl RouterBuilder {
    pub fn option(mut self, option: RouterOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn get<I, O, E, F, Fut>(self, handler: F) -> Self
    where
        I: Input,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        O: Reply,
        E: Into<BoxError> + 'static,
    {
        self.option(get(handler))
    }

    pub fn post<I, O, E, F, Fut>(self, handler: F) -> Self
    where
        I: Input,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        O: Reply,
        E: Into<BoxError> + 'static,
    {
        self.option(post(handler))
    }

    pub fn put<I, O, E, F, Fut>(self, handler: F) -> Self
    where
        I: Input,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        O: Reply,
        E: Into<BoxError> + 'static,
    {
        self.option(put(handler))
    }

    pub fn delete<I, O, E, F, Fut>(self, handler: F) -> Self
    where
        I: Input,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        O: Reply,
        E: Into<BoxError> + 'static,
    {
        self.option(delete(handler))
    }

    pub fn by_name<T: Any + Send>(
        self,
        name: impl Into<String>,
        options: impl IntoIterator<Item = FieldOption<T>>,
    ) -> Self {
        self.option(by_name(name, options))
    }

    pub fn by_type<T: Any + Send>(self, options: impl IntoIterator<Item = FieldOption<T>>) -> Self {
        self.option(by_type(options))
    }

    pub fn path_by_name_of_fixed_typed<F>(self, convert: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.option(path_by_name_of_fixed_typed(convert))
    }

    pub fn response_encoder(self, encoder: impl ResponseEncoder) -> Self {
        self.option(response_encoder(encoder))
    }

    pub fn json_response(self) -> Self {
        self.option(json_response())
    }

    pub fn handle_error(self, handler: impl ErrorHandler) -> Self {
        self.option(handle_error(handler))
    }

    pub fn middleware<L>(self, layer: L) -> Self
    where
        L: Layer<RouteService> + Send + Sync + 'static,
        L::Service: Service<Request<Body>, Response = Response<Body>, Error = Infallible>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Request<Body>>>::Future: Send + 'static,
    {
        self.option(middleware(layer))
    }

    pub fn body_limit(self, bytes: usize) -> Self {
        self.option(body_limit(bytes))
    }

    /// Apply the collected options in order.
    ///
    /// # Errors
    /// The first failing option's error.
    pub fn build(self) -> Result<Router, RegistrationError> {
        Router::new(self.options)
    }
}

fn route<I, O, E, F, Fut>(method: Method, handler: F) -> RouterOption
where
    I: Input,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Reply,
    E: Into<BoxError> + 'static,
{
    let handler = erase_handler(handler);
    RouterOption::new(move |state| state.register::<I>(method, handler))
}

/// Register `handler` for GET (and HEAD) requests. The route's path is
/// derived from the field options bound to `I`'s fields.
pub fn get<I, O, E, F, Fut>(handler: F) -> RouterOption
where
    I: Input,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Reply,
    E: Into<BoxError> + 'static,
{
    route(Method::GET, handler)
}

pub fn post<I, O, E, F, Fut>(handler: F) -> RouterOption
where
    I: Input,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Reply,
    E: Into<BoxError> + 'static,
{
    route(Method::POST, handler)
}

pub fn put<I, O, E, F, Fut>(handler: F) -> RouterOption
where
    I: Input,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Reply,
    E: Into<BoxError> + 'static,
{
    route(Method::PUT, handler)
}

pub fn delete<I, O, E, F, Fut>(handler: F) -> RouterOption
where
    I: Input,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Reply,
    E: Into<BoxError> + 'static,
{
    route(Method::DELETE, handler)
}

/// Bind every field named `name` (in routes registered later) to
/// `options`, applied in order.
pub fn by_name<T: Any + Send>(
    name: impl Into<String>,
    options: impl IntoIterator<Item = FieldOption<T>>,
) -> RouterOption {
    let name = name.into();
    let option = erase(options.into_iter().collect());
    RouterOption::new(move |state| {
        state.registry.add_name_option(name, option);
        Ok(())
    })
}

/// Bind every field declared as `T` that has no binding by name.
pub fn by_type<T: Any + Send>(options: impl IntoIterator<Item = FieldOption<T>>) -> RouterOption {
    let option = erase(options.into_iter().collect());
    RouterOption::new(move |state| {
        state.registry.add_type_option(TypeTag::of::<T>(), option);
        Ok(())
    })
}

/// Apply `options` in order as a single option.
pub fn join(options: impl IntoIterator<Item = RouterOption>) -> RouterOption {
    let options: Vec<_> = options.into_iter().collect();
    RouterOption::new(move |state| {
        for option in options {
            option.apply(state)?;
        }
        Ok(())
    })
}

/// Reserve a fixed segment, named by `convert(field name)`, for every
/// [`Fixed`] field.
pub fn path_by_name_of_fixed_typed<F>(convert: F) -> RouterOption
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    by_type([path_by_name::<Fixed, _>(convert)])
}

pub fn response_encoder(encoder: impl ResponseEncoder) -> RouterOption {
    let encoder: Arc<dyn ResponseEncoder> = Arc::new(encoder);
    RouterOption::new(move |state| {
        state.encoder = Some(encoder);
        Ok(())
    })
}

pub fn json_response() -> RouterOption {
    response_encoder(JsonResponseEncoder)
}

pub fn handle_error(handler: impl ErrorHandler) -> RouterOption {
    let handler: Arc<dyn ErrorHandler> = Arc::new(handler);
    RouterOption::new(move |state| {
        state.error_handler = Some(handler);
        Ok(())
    })
}

/// Wrap every route registered after this option in `layer`. Layers added
/// later end up outermost.
pub fn middleware<L>(layer: L) -> RouterOption
where
    L: Layer<RouteService> + Send + Sync + 'static,
    L::Service: Service<Request<Body>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    <L::Service as Service<Request<Body>>>::Future: Send + 'static,
{
    let wrap: Wrap = Arc::new(move |service| RouteService::new(layer.layer(service)));
    RouterOption::new(move |state| {
        state.middleware.push(wrap);
        Ok(())
    })
}

/// Largest request body buffered before field binding.
pub fn body_limit(bytes: usize) -> RouterOption {
    RouterOption::new(move |state| {
        state.body_limit = bytes;
        Ok(())
    })
}
