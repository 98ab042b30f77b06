//! Terminal presentation for the `chirp` binary.

pub mod terminal;
