use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::error::ConfigError;

/// Language packs shipped with the client-side component library.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "ar", "ar-TN", "az-Latn", "bg", "bn", "ca", "cs", "da", "de", "de-CH", "el", "en-GB",
    "en-US", "eo", "es", "et", "eu", "fa", "fa-IR", "fi", "fr", "gn", "he", "hr", "hu", "hy",
    "id", "is", "it", "ja", "kk", "km", "ko-KR", "kur-CKB", "lt", "lu", "lv", "mk", "ml", "mm",
    "ms", "ms-MY", "nb-NO", "nl", "pl", "pt", "pt-BR", "ro", "ru", "sk-SK", "sl", "sm", "sr",
    "sr-CYR", "sv", "ta", "th", "tr", "ug", "uk", "uz-Cyrl", "uz-Latn", "vi", "zh-CN", "zh-TW",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Language(String);

impl Language {
    /// Accepts a tag from [`SUPPORTED_LANGUAGES`]. Matching ignores ASCII case
    /// but the canonical spelling is stored.
    pub fn parse(tag: &str) -> Result<Self, ConfigError> {
        let tag = tag.trim();
        SUPPORTED_LANGUAGES
            .iter()
            .find(|known| known.eq_ignore_ascii_case(tag))
            .map(|known| Language((*known).to_string()))
            .ok_or_else(|| ConfigError::UnsupportedLanguage(tag.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Language {
    fn default() -> Self {
        Language("en-US".to_string())
    }
}

impl TryFrom<String> for Language {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Language::parse(&value)
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
