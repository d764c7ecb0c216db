// Callback system: the registry plus the built-in operation chains.

pub mod create;
pub mod delete;
pub mod query;
pub mod registry;
pub mod stamp;
pub mod update;

pub use registry::*;
