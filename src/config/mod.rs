//! Configuration documents and their on-disk locations

pub mod model;
pub mod paths;

pub use model::{
    merge_into_defaults, DeviceIdentity, DeviceRef, InterfaceRef, NetworkConfig, PersistentConfig,
    PersistentSettings, UserConfig, UserSettings, WindowState,
};
pub use paths::ConfigPaths;
