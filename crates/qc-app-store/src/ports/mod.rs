//! Hexagonal architecture ports (interfaces)

pub mod store;

pub use store::*;
