//! Probe adapters
//!
//! Host-backed implementations of the probe ports:
//! - SystemProbe: process tree memory/CPU, free space, output activity
//! - KillFile: kill instruction dropped into the work directory
//! - ProxyFile / NoProxy: credential validity

pub mod kill_file;
pub mod proxy_file;
pub mod system;

pub use kill_file::KillFile;
pub use proxy_file::{NoProxy, ProxyFile};
pub use system::SystemProbe;
