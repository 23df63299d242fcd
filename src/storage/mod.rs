use std::collections::HashMap;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod middleware;

pub use middleware::{browser_id_middleware, BrowserId, BROWSER_ID_COOKIE};

/// Browser ids stay valid for 30 days.
pub const BROWSER_ID_TTL_DAYS: i64 = 30;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("A storage secret is required for per-browser storage")]
    SecretRequired,

    #[error("Invalid browser id token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid browser id: {0}")]
    Id(#[from] uuid::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct BrowserClaims {
    sub: String,
    iat: usize,
    exp: usize,
}

/// Key/value storage shared by all pages, plus one store per browser when
/// a secret is configured.
pub struct Storage {
    secret: Option<String>,
    general: RwLock<Map<String, Value>>,
    browsers: RwLock<HashMap<Uuid, Map<String, Value>>>,
}

impl Storage {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret,
            general: RwLock::new(Map::new()),
            browsers: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_browser_storage_enabled(&self) -> bool {
        self.secret.is_some()
    }

    pub async fn general_get(&self, key: &str) -> Option<Value> {
        self.general.read().await.get(key).cloned()
    }

    pub async fn general_set(&self, key: impl Into<String>, value: Value) {
        self.general.write().await.insert(key.into(), value);
    }

    pub async fn browser_get(&self, id: &BrowserId, key: &str) -> Result<Option<Value>, StorageError> {
        self.require_secret()?;
        Ok(self
            .browsers
            .read()
            .await
            .get(&id.0)
            .and_then(|store| store.get(key).cloned()))
    }

    pub async fn browser_set(
        &self,
        id: &BrowserId,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), StorageError> {
        self.require_secret()?;
        self.browsers
            .write()
            .await
            .entry(id.0)
            .or_default()
            .insert(key.into(), value);
        Ok(())
    }

    pub async fn browser_count(&self) -> usize {
        self.browsers.read().await.len()
    }

    /// Signs a browser id into a cookie token.
    pub fn sign(&self, id: Uuid) -> Result<String, StorageError> {
        let secret = self.require_secret()?;
        let now = Utc::now();
        let claims = BrowserClaims {
            sub: id.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + Duration::days(BROWSER_ID_TTL_DAYS)).timestamp() as usize,
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?)
    }

    pub fn verify(&self, token: &str) -> Result<Uuid, StorageError> {
        let secret = self.require_secret()?;
        let data = decode::<BrowserClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(Uuid::parse_str(&data.claims.sub)?)
    }

    fn require_secret(&self) -> Result<&str, StorageError> {
        self.secret.as_deref().ok_or(StorageError::SecretRequired)
    }
}
