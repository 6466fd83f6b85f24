//! Data types shared across the pipeline.

pub mod job;
pub mod settings;
pub mod stats;
pub mod validation;
