//! Core trait abstractions.

pub mod document;
pub mod store;
pub mod transport;
