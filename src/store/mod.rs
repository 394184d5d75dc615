//! Debounced, atomic configuration persistence

pub mod config_store;
pub mod debounce;

pub use config_store::{ConfigStore, Document};
pub use debounce::Debounce;
