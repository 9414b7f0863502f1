pub mod catalog;
pub mod finance;
pub mod marina;
pub mod security;
pub mod technic;

pub use catalog::{builtin_catalog, builtin_handlers, builtin_registry};
