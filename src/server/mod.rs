pub mod builder;
pub mod handler;
pub mod listener;
pub mod shutdown;

pub use builder::{Server, ServerBuilder};
pub use handler::ConnectionHandler;
pub use shutdown::{ShutdownCoordinator, ShutdownState};
