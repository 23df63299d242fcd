use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::HeaderValue;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::shared::error::ConfigError;
use crate::shared::favicon::Favicon;
use crate::shared::language::Language;

pub const DEFAULT_TITLE: &str = "Lumen";
pub const DEFAULT_VIEWPORT: &str = "width=device-width, initial-scale=1";
pub const DEFAULT_CACHE_CONTROL: &str =
    "public, max-age=31536000, immutable, stale-while-revalidate=31536000";

static MOUNT_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(/[A-Za-z0-9._~!$&'()+,;=:@%-]+)+$").expect("valid regex"));

/// Options accepted by [`crate::run_with`]. Every field has the documented
/// default, so a config file only needs the values it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub title: String,
    pub viewport: String,
    pub favicon: Option<String>,
    /// `None` selects automatic dark mode.
    pub dark: Option<bool>,
    pub language: String,
    pub binding_refresh_interval: f64,
    pub reconnect_timeout: f64,
    pub message_history_length: usize,
    pub cache_control_directives: String,
    pub mount_path: String,
    pub on_air: OnAir,
    pub tailwind: bool,
    pub prod_js: bool,
    pub storage_secret: Option<String>,
    pub show_welcome_message: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            viewport: DEFAULT_VIEWPORT.to_string(),
            favicon: None,
            dark: Some(false),
            language: "en-US".to_string(),
            binding_refresh_interval: 0.1,
            reconnect_timeout: 3.0,
            message_history_length: 1000,
            cache_control_directives: DEFAULT_CACHE_CONTROL.to_string(),
            mount_path: "/".to_string(),
            on_air: OnAir::Disabled,
            tailwind: true,
            prod_js: true,
            storage_secret: None,
            show_welcome_message: true,
        }
    }
}

/// Remote access request. In a config file this is `true`, `false`, `null`
/// or a token string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "Option<OnAirValue>")]
pub enum OnAir {
    #[default]
    Disabled,
    Enabled,
    Token(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OnAirValue {
    Flag(bool),
    Token(String),
}

impl From<Option<OnAirValue>> for OnAir {
    fn from(value: Option<OnAirValue>) -> Self {
        match value {
            None | Some(OnAirValue::Flag(false)) => OnAir::Disabled,
            Some(OnAirValue::Flag(true)) => OnAir::Enabled,
            Some(OnAirValue::Token(token)) => OnAir::Token(token),
        }
    }
}

impl OnAir {
    /// Relay identifier for the tunnel, or `None` when remote access is off.
    /// An empty token counts as off.
    pub fn relay_token(&self) -> Option<&str> {
        match self {
            OnAir::Disabled => None,
            OnAir::Enabled => Some(""),
            OnAir::Token(token) if token.is_empty() => None,
            OnAir::Token(token) => Some(token),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DarkMode {
    Light,
    Dark,
    Auto,
}

impl From<Option<bool>> for DarkMode {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => DarkMode::Dark,
            Some(false) => DarkMode::Light,
            None => DarkMode::Auto,
        }
    }
}

/// Base path the framework is served under, without a trailing slash
/// (except for the root itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPath(String);

impl MountPath {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed == "/" {
            return Ok(Self::root());
        }
        let normalized = trimmed.trim_end_matches('/');
        if !MOUNT_PATH_RE.is_match(normalized) {
            return Err(ConfigError::InvalidMountPath(raw.to_string()));
        }
        Ok(MountPath(normalized.to_string()))
    }

    pub fn root() -> Self {
        MountPath("/".to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix to prepend to framework-relative paths: empty for the root.
    pub fn prefix(&self) -> &str {
        if self.is_root() {
            ""
        } else {
            &self.0
        }
    }
}

/// The validated, immutable run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub title: String,
    pub viewport: String,
    pub favicon: Favicon,
    pub dark: DarkMode,
    pub language: Language,
    pub binding_refresh_interval: Duration,
    pub reconnect_timeout: Duration,
    pub message_history_length: usize,
    pub cache_control: HeaderValue,
    pub mount_path: MountPath,
    pub tailwind: bool,
    pub prod_js: bool,
    pub show_welcome_message: bool,
}

impl RunOptions {
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load_default() -> Result<(Self, PathBuf), ConfigError> {
        let path = resolve_config_path();
        let options = Self::load_from_path(&path)?;
        Ok((options, path))
    }

    pub fn validate(&self) -> Result<RunConfig, ConfigError> {
        let viewport = self.viewport.trim();
        if viewport.is_empty() {
            return Err(ConfigError::EmptyViewport);
        }

        let favicon = match self.favicon.as_deref() {
            Some(raw) => Favicon::parse(raw)?,
            None => Favicon::Default,
        };

        let cache_control = HeaderValue::from_str(self.cache_control_directives.trim())
            .map_err(|_| ConfigError::InvalidCacheControl(self.cache_control_directives.clone()))?;

        if matches!(self.storage_secret.as_deref(), Some(secret) if secret.is_empty()) {
            return Err(ConfigError::EmptyStorageSecret);
        }

        let title = match self.title.trim() {
            "" => DEFAULT_TITLE,
            title => title,
        };

        Ok(RunConfig {
            title: title.to_string(),
            viewport: viewport.to_string(),
            favicon,
            dark: DarkMode::from(self.dark),
            language: Language::parse(&self.language)?,
            binding_refresh_interval: positive_seconds(
                "binding_refresh_interval",
                self.binding_refresh_interval,
            )?,
            reconnect_timeout: non_negative_seconds("reconnect_timeout", self.reconnect_timeout)?,
            message_history_length: self.message_history_length,
            cache_control,
            mount_path: MountPath::parse(&self.mount_path)?,
            tailwind: self.tailwind,
            prod_js: self.prod_js,
            show_welcome_message: self.show_welcome_message,
        })
    }
}

fn non_negative_seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidDuration {
            field,
            value,
            constraint: ">= 0",
        });
    }
    Ok(Duration::from_secs_f64(value))
}

fn positive_seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::InvalidDuration {
            field,
            value,
            constraint: "> 0",
        });
    }
    Ok(Duration::from_secs_f64(value))
}

pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("LUMEN_CONFIG_PATH") {
        return expand_path(path);
    }

    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lumen")
        .join("lumen.json")
}

fn expand_path(input: String) -> PathBuf {
    if let Some(stripped) = input.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(input)
}

fn home_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        std::env::var_os("USERPROFILE").map(PathBuf::from)
    } else {
        std::env::var_os("HOME").map(PathBuf::from)
    }
}
