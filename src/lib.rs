//! Lumen serves browser-rendered pages from server-side Rust. This crate
//! attaches the framework to an existing axum application with [`run_with`].

pub mod app;
pub mod host;
pub mod rest;
pub mod run_with;
pub mod shared;
pub mod storage;

pub use app::{Air, AppContext, Framework, Phase};
pub use host::{HostApp, Lifespan, LifespanState, NoopLifespan};
pub use rest::MiddlewareKind;
pub use run_with::run_with;
pub use shared::{ConfigError, DarkMode, LumenError, MountPath, OnAir, RunConfig, RunOptions};
pub use storage::{BrowserId, Storage, StorageError};
