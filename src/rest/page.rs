use quick_xml::escape::escape;
use serde::Serialize;

use crate::rest::routes::static_base;
use crate::shared::{DarkMode, RunConfig};

/// Values handed to the browser-side runtime.
#[derive(Debug, Serialize)]
pub struct ClientConfig<'a> {
    pub prefix: &'a str,
    pub version: &'static str,
    pub language: &'a str,
    pub dark: &'static str,
    pub binding_refresh_interval: f64,
    pub reconnect_timeout: f64,
    pub message_history_length: usize,
    pub tailwind: bool,
    pub prod_js: bool,
}

impl<'a> ClientConfig<'a> {
    pub fn new(config: &'a RunConfig, prefix: &'a str) -> Self {
        Self {
            prefix,
            version: env!("CARGO_PKG_VERSION"),
            language: config.language.as_str(),
            dark: match config.dark {
                DarkMode::Light => "light",
                DarkMode::Dark => "dark",
                DarkMode::Auto => "auto",
            },
            binding_refresh_interval: config.binding_refresh_interval.as_secs_f64(),
            reconnect_timeout: config.reconnect_timeout.as_secs_f64(),
            message_history_length: config.message_history_length,
            tailwind: config.tailwind,
            prod_js: config.prod_js,
        }
    }
}

/// Renders the page served at the mount root when the application did not
/// register one.
pub fn render_index(config: &RunConfig, prefix: &str) -> String {
    let client = serde_json::to_string(&ClientConfig::new(config, prefix))
        .unwrap_or_else(|_| "{}".to_string())
        // keep the JSON from closing the script element
        .replace("</", "<\\/");

    let (html_class, body_attrs) = match config.dark {
        DarkMode::Dark => (" class=\"dark\"", " class=\"body--dark\""),
        DarkMode::Light => ("", " class=\"body--light\""),
        DarkMode::Auto => ("", " data-dark=\"auto\""),
    };
    let assets = format!("{prefix}{}", static_base());

    format!(
        r#"<!DOCTYPE html>
<html lang="{lang}"{html_class}>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="{viewport}">
    <title>{title}</title>
    <link rel="icon" href="{favicon}">
    <link rel="stylesheet" href="{assets}/lumen.css">
    <script id="lumen-config" type="application/json">{client}</script>
    <script src="{assets}/lumen.js" defer></script>
</head>
<body{body_attrs}>
    <div class="lumen-content">
        <h1>{title}</h1>
    </div>
</body>
</html>
"#,
        lang = escape(config.language.as_str()),
        viewport = escape(&config.viewport),
        title = escape(&config.title),
        favicon = escape(&config.favicon.href(prefix)),
    )
}
