pub mod graph;
pub mod registry;
pub mod runner;

pub use graph::{GraphCatalog, TaskGraph, TaskNode};
pub use registry::{FallbackHandler, FnHandler, HandlerRegistry};
pub use runner::PlanRunner;
