//! Ports: the traits the router consumes from its collaborators.
pub mod encoder;
pub mod error_handler;

pub use encoder::{Reply, ResponseEncoder};
pub use error_handler::ErrorHandler;
