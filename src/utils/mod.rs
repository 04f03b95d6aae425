pub mod graceful_shutdown;
pub mod path;

pub use graceful_shutdown::{GracefulShutdown, ShutdownReason};
pub use path::{PathError, decode_segment, split_path};
