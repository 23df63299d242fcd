pub mod config;
pub mod error;
pub mod favicon;
pub mod language;
pub mod logging;

pub use config::{DarkMode, MountPath, OnAir, RunConfig, RunOptions};
pub use error::{ConfigError, LumenError};
