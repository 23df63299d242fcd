use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_RELAY_URL: &str = "https://relay.lumen.dev";

#[derive(Serialize)]
struct ConnectRequest<'a> {
    token: &'a str,
    version: &'a str,
}

#[derive(Deserialize)]
struct ConnectResponse {
    url: String,
}

/// Relay client giving temporary remote access to a locally served app.
pub struct Air {
    token: String,
    relay_url: String,
    http: Client,
    remote_url: Mutex<Option<String>>,
}

impl Air {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let relay_url = std::env::var("LUMEN_AIR_RELAY")
            .unwrap_or_else(|_| DEFAULT_RELAY_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self::with_relay(token, relay_url)
    }

    pub fn with_relay(token: impl Into<String>, relay_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("failed to build relay client: {e}"))?;
        Ok(Self {
            token: token.into(),
            relay_url: relay_url.into(),
            http,
            remote_url: Mutex::new(None),
        })
    }

    /// Relay identifier; empty when the relay should assign one.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    pub fn remote_url(&self) -> Option<String> {
        self.remote_url
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn is_connected(&self) -> bool {
        self.remote_url().is_some()
    }

    pub async fn connect(&self) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/connect", self.relay_url))
            .json(&ConnectRequest {
                token: &self.token,
                version: env!("CARGO_PKG_VERSION"),
            })
            .send()
            .await?
            .error_for_status()?;
        let body: ConnectResponse = response.json().await?;

        info!(remote_url = %body.url, "Lumen On Air connected");
        self.set_remote_url(Some(body.url.clone()));
        Ok(body.url)
    }

    pub fn disconnect(&self) {
        if self.is_connected() {
            info!("Lumen On Air disconnected");
        } else {
            warn!("Lumen On Air was not connected");
        }
        self.set_remote_url(None);
    }

    fn set_remote_url(&self, url: Option<String>) {
        match self.remote_url.lock() {
            Ok(mut guard) => *guard = url,
            Err(poisoned) => *poisoned.into_inner() = url,
        }
    }
}

impl std::fmt::Debug for Air {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Air")
            .field("token", &self.token)
            .field("relay_url", &self.relay_url)
            .finish()
    }
}
