pub mod address;
pub mod environment;
pub mod logging;
pub mod model;

pub use environment::Environment;
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
