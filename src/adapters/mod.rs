pub mod error_handler;
pub mod json;
pub mod middleware;

pub use error_handler::PlainTextErrorHandler;
pub use json::JsonResponseEncoder;
pub use middleware::{request_id_middleware, request_timing_middleware};
