//! fieldroute - a declarative HTTP request router binding typed handler
//! inputs field by field.
//!
//! A handler takes a single input value. Its type lists its fields through
//! [`Input::fields`], and the router binds each field to a [`FieldOption`]
//! registered by field name or by field type. Options that consume path
//! segments also shape the route: registering a handler compiles the options
//! of every field in declaration order, and the path positions they reserve
//! become the route's position in a per-method path trie.
//!
//! # Matching
//! The trie holds fixed segments, single variable segments and catch-all
//! remainders. At each node a fixed child is tried first, then the variable
//! child, then the node's own remainder flag. GET and HEAD share a trie;
//! POST, PUT and DELETE have their own; other methods never match.
//!
//! # Request lifecycle
//! 1. The path is split on `/` and every segment percent-decoded once.
//! 2. A miss answers 404, a malformed escape 400.
//! 3. The body is buffered up to the configured limit.
//! 4. Field modifiers populate a fresh input in declaration order. Each may
//!    return a [`Closer`] that releases what it acquired.
//! 5. The handler runs (not for HEAD) and its output is encoded.
//! 6. Closers run in reverse acquisition order, each seeing the request's
//!    terminal error at that moment.
//!
//! Panics in modifiers, handlers, encoders and closers are recovered and
//! reported as errors, without skipping pending closers.
//!
//! # Quick Example
//! ```no_run
//! use fieldroute::{BoxError, Fields, Fixed, Input, Router, router};
//!
//! #[derive(Default)]
//! struct Hello {
//!     hello: Fixed,
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Input for Hello {
//!     fn fields() -> Fields<Self> {
//!         Fields::new()
//!             .field("hello", |h: &mut Self| &mut h.hello)
//!             .field("id", |h: &mut Self| &mut h.id)
//!             .field("name", |h: &mut Self| &mut h.name)
//!     }
//! }
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! // GET /hello/{id}/{name}
//! let app = Router::builder()
//!     .path_by_name_of_fixed_typed(|name| name.to_lowercase())
//!     .by_type([fieldroute::int_path_ids()])
//!     .by_type([fieldroute::string_path_ids()])
//!     .get(|h: Hello| async move { Ok::<_, BoxError>(format!("{} times {}", h.id, h.name)) })
//!     .build()?;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, axum::Router::new().fallback_service(app)).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! `core` holds the trie, field binding, modifier composition and request
//! execution. `ports` are the traits the router consumes from collaborators
//! (response encoding, error rendering) and `adapters` their default
//! implementations. `config`, `metrics` and `tracing_setup` serve the
//! `fieldroute` binary and embedding applications.
//!
//! # Concurrency
//! Assembly is single-threaded and finishes before the router serves. The
//! built router is immutable and shared across requests; state captured by
//! field options must bring its own synchronization.
pub mod adapters;
pub mod config;
pub mod core;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub use crate::{
    adapters::{JsonResponseEncoder, PlainTextErrorHandler},
    core::{
        BoxError, CleanupStack, Closer, FieldDef, FieldInfo, FieldModifier, FieldOption, Fields,
        Fixed, Input, Outcome, Panicked, PathExhausted, RegistrationError, Remainder,
        RequestContext, RequestError, RequestId, Route, RouteService, Router, RouterBuilder,
        RouterOption, TypeTag,
        options::{
            ValueError, body, closable_request_value, header, int_path_ids, json_body,
            optional_query_value, parsed_path_ids, path, path_by_name, path_id, path_remainder,
            query_value, query_values, request_value, string_path_ids,
        },
        router,
    },
    ports::{ErrorHandler, Reply, ResponseEncoder},
};
