//! Infrastructure layer module
//!
//! Adapters and external integrations:
//! - Configuration loading and unit normalization
//! - Logging infrastructure
//! - Job journal
//! - Host probes (process tree, disk, output, kill file, proxy)
//! - Payload process management
//! - Heartbeat delivery and the pilot heartbeat file
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod config;
pub mod heartbeat;
pub mod journal;
pub mod logging;
pub mod probes;
pub mod process;
