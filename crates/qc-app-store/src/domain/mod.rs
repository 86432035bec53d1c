pub mod cache;
pub mod entities;
pub mod errors;
pub mod merkle;

pub use cache::*;
pub use entities::*;
pub use errors::*;
pub use merkle::*;
