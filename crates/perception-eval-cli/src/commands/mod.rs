//! CLI command implementations.

pub mod dataset;
pub mod run;
pub mod summary;
