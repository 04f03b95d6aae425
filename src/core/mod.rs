pub mod engine;
pub mod error;
pub mod modifier;
pub mod node;
pub mod options;
pub(crate) mod registry;
pub mod route;
pub mod router;
pub mod schema;

pub use engine::RouteService;
pub use error::{BoxError, Panicked, RegistrationError, RequestError};
pub use modifier::{CleanupStack, Closer, FieldInfo, FieldModifier, FieldOption, Outcome};
pub use node::{MethodRoots, Node};
pub use route::{PathExhausted, PathStep, RequestContext, Route};
pub use router::{RequestId, Router, RouterBuilder, RouterOption};
pub use schema::{FieldDef, Fields, Fixed, Input, Remainder, TypeTag};
