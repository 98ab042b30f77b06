//! chirp: client-side resource cache with write coordination for a small
//! social feed.
//!
//! Layers follow the usual split: `domain` (identity, ids, body rules),
//! `cache` (keyed resource cache), `application` (submission sites, auth
//! gate), `infra` (HTTP adapter, telemetry) and `presentation` (terminal).

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
