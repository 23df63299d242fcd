use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine};
use quick_xml::escape::escape;

use crate::shared::error::ConfigError;

const DEFAULT_ICON: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 64 64"><circle cx="32" cy="32" r="28" fill="#5898d4"/><path d="M20 40 L32 18 L44 40 Z" fill="#fff"/></svg>"##;

/// Where the page icon comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Favicon {
    #[default]
    Default,
    Path(PathBuf),
    Url(String),
    DataUrl { mime: String, bytes: Vec<u8> },
    Emoji(String),
}

impl Favicon {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(ConfigError::InvalidFavicon(raw.to_string()));
        }

        if value.starts_with("http://") || value.starts_with("https://") {
            url::Url::parse(value).map_err(|_| ConfigError::InvalidFavicon(raw.to_string()))?;
            return Ok(Favicon::Url(value.to_string()));
        }

        if let Some(rest) = value.strip_prefix("data:") {
            return parse_data_url(rest).ok_or_else(|| ConfigError::InvalidFavicon(raw.to_string()));
        }

        if is_emoji(value) {
            return Ok(Favicon::Emoji(value.to_string()));
        }

        Ok(Favicon::Path(PathBuf::from(value)))
    }

    /// Link target for the page head. Remote icons are linked directly,
    /// everything else is served by the framework under `prefix`.
    pub fn href(&self, prefix: &str) -> String {
        match self {
            Favicon::Url(url) => url.clone(),
            _ => format!("{prefix}/favicon.ico"),
        }
    }

    pub fn default_svg() -> &'static str {
        DEFAULT_ICON
    }
}

/// Renders a single character as an SVG icon.
pub fn emoji_to_svg(emoji: &str) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100"><text y=".9em" font-size="90" x="50%" text-anchor="middle">{}</text></svg>"#,
        escape(emoji)
    )
}

fn is_emoji(value: &str) -> bool {
    let count = value.chars().count();
    if count == 1 {
        return !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '/');
    }
    // Multi-codepoint emoji: flags, skin tones, joiner sequences.
    count <= 8 && !value.is_ascii() && !value.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\' || c == '.')
}

fn parse_data_url(rest: &str) -> Option<Favicon> {
    let (meta, data) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let mime = if mime.is_empty() { "text/plain" } else { mime };
    let bytes = STANDARD.decode(data).ok()?;
    Some(Favicon::DataUrl {
        mime: mime.to_string(),
        bytes,
    })
}
