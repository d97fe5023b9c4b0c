//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces the infrastructure adapters implement:
//! - ResourceProbe: disk, memory, CPU and output sampling
//! - ProxyInspector: remaining credential validity
//! - KillInstructionSource: out-of-band kill requests
//! - HeartbeatSender: status delivery to the central service
//! - JobLauncher / PayloadControl: payload process start and signalling

pub mod heartbeat_sender;
pub mod job_launcher;
pub mod kill_instruction;
pub mod proxy_inspector;
pub mod resource_probe;

pub use heartbeat_sender::{HeartbeatAck, HeartbeatMessage, HeartbeatSender};
pub use job_launcher::{JobLauncher, LaunchedPayload, PayloadCommand, PayloadControl, PayloadExit};
pub use kill_instruction::{KillInstruction, KillInstructionSource};
pub use proxy_inspector::ProxyInspector;
pub use resource_probe::{DiskUsage, OutputActivity, ResourceProbe};
