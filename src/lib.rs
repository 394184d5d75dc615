//! # Stream Monitor
//!
//! Control-plane orchestrator for a desktop audio-over-IP monitoring tool.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           ORCHESTRATOR                               │
//! │                                                                      │
//! │   UI client ──messages──▶ ┌────────────────┐                         │
//! │   UI client ◀──events──── │ Message Router │                         │
//! │                           └───────┬────────┘                         │
//! │                                   │                                  │
//! │          ┌────────────────────────┼───────────────────────┐          │
//! │          ▼                        ▼                       ▼          │
//! │  ┌───────────────┐      ┌─────────────────┐     ┌────────────────┐   │
//! │  │  Dual Store   │      │   Reconcilers   │     │   Supervisor   │   │
//! │  │ config.json   │      │ audio devices   │     │ discovery proc │   │
//! │  │ user.json     │      │ net interfaces  │     │ playback proc  │   │
//! │  │ (debounced,   │      │ (2s tick loop)  │     │ (NDJSON stdio) │   │
//! │  │  atomic)      │      └─────────────────┘     └────────────────┘   │
//! │  └───────────────┘                                                   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The router, reconcilers, and tick loop all run as non-overlapping units
//! of work on a single task; the two config documents are never touched
//! concurrently, so they carry no locks. The discovery and playback workers
//! are opaque child processes reached only by fire-and-forget messages.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod store;
pub mod system;
pub mod worker;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Trailing-edge debounce applied to every scheduled config save
    pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(300);

    /// Period of the reconciliation tick (interfaces + devices + lazy init)
    pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(2);

    /// File name of the machine-wide configuration document
    pub const PERSISTENT_FILE: &str = "config.json";

    /// File name of the per-user configuration document
    pub const USER_FILE: &str = "user.json";

    /// Directory name used under both config roots
    pub const APP_DIR: &str = "StreamMonitor";
}
