use thiserror::Error;

/// Rejected configuration values, reported before anything is mounted.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid mount path '{0}': must start with '/' and contain only plain path segments")]
    InvalidMountPath(String),

    #[error("Unsupported language '{0}'")]
    UnsupportedLanguage(String),

    #[error("Invalid {field}: {value} (expected a finite number of seconds {constraint})")]
    InvalidDuration {
        field: &'static str,
        value: f64,
        constraint: &'static str,
    },

    #[error("Invalid cache control directives '{0}'")]
    InvalidCacheControl(String),

    #[error("Invalid favicon '{0}'")]
    InvalidFavicon(String),

    #[error("Viewport must not be empty")]
    EmptyViewport,

    #[error("Storage secret must not be empty")]
    EmptyStorageSecret,

    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum LumenError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mount error: {0}")]
    Mount(String),

    #[error("Framework startup failed: {0:#}")]
    FrameworkStartup(anyhow::Error),

    #[error("Framework shutdown failed: {0:#}")]
    FrameworkShutdown(anyhow::Error),

    #[error("Remote access setup failed: {0:#}")]
    Tunnel(anyhow::Error),

    #[error("Framework already started")]
    AlreadyStarted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LumenError>;
