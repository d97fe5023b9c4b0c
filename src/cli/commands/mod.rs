//! CLI command implementations.

pub mod run;
pub mod thresholds;
pub mod validate;
