//! Worker process supervision and protocol

pub mod protocol;
pub mod supervisor;

pub use protocol::{manual_streams_hash, DiscoveryCommand, PlaybackCommand, RestartArgs};
pub use supervisor::{WorkerConfig, WorkerEvent, WorkerKind, WorkerSupervisor};
