//! Application services: submission sites, the auth gate and their collaborators.

pub mod auth;
pub mod error;
pub mod navigation;
pub mod notify;
pub mod submission;
