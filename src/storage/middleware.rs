use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::AppContext;
use crate::rest::middleware::public_prefix;
use crate::storage::BROWSER_ID_TTL_DAYS;

pub const BROWSER_ID_COOKIE: &str = "lumen-id";

/// Identifies the browser a request came from. Available as a request
/// extension when a storage secret is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrowserId(pub Uuid);

pub async fn browser_id_middleware(
    State(ctx): State<Arc<AppContext>>,
    mut request: Request,
    next: Next,
) -> Response {
    let storage = ctx.storage();
    let known = cookie_value(request.headers(), BROWSER_ID_COOKIE)
        .and_then(|token| storage.verify(token).ok());

    let (id, issued) = match known {
        Some(id) => (id, None),
        None => {
            let id = Uuid::new_v4();
            match storage.sign(id) {
                Ok(token) => (id, Some(token)),
                Err(e) => {
                    warn!("Could not sign browser id: {}", e);
                    return next.run(request).await;
                }
            }
        }
    };

    let path = cookie_path(request.headers(), &ctx);
    request.extensions_mut().insert(BrowserId(id));
    let mut response = next.run(request).await;

    if let Some(token) = issued {
        debug!(browser_id = %id, path = %path, "Issued browser id");
        let cookie = format!(
            "{BROWSER_ID_COOKIE}={token}; Path={path}; Max-Age={}; HttpOnly; SameSite=Lax",
            BROWSER_ID_TTL_DAYS * 24 * 60 * 60
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!("Could not encode browser id cookie: {}", e),
        }
    }

    response
}

/// Path the browser sees the framework under, so the cookie comes back on
/// every framework request behind a prefixing proxy too.
fn cookie_path(headers: &HeaderMap, ctx: &AppContext) -> String {
    let prefix = public_prefix(headers, ctx);
    if prefix.is_empty() || !prefix.starts_with('/') || prefix.contains([';', ',', ' ']) {
        return "/".to_string();
    }
    prefix
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
