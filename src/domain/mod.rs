//! Domain layer types and invariants.

pub mod error;
pub mod identity;
pub mod posts;
pub mod resources;
pub mod types;
