use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::Response,
    Router,
};
use serde::Serialize;
use tower_http::compression::{
    predicate::{DefaultPredicate, Predicate, SizeAbove},
    CompressionLayer,
};
use tracing::{debug, warn};

use crate::app::AppContext;
use crate::rest::routes::FRAMEWORK_PREFIX;

/// Responses smaller than this are sent uncompressed.
pub const GZIP_MINIMUM_SIZE: u16 = 500;

pub const FORWARDED_PREFIX_HEADER: &str = "x-forwarded-prefix";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewareKind {
    Compression,
    RedirectWithPrefix,
    CacheControl,
}

impl MiddlewareKind {
    /// Attach order. Each entry wraps the ones before it, so cache-control
    /// is the outermost layer and compression the innermost.
    pub const INSTALL_ORDER: [MiddlewareKind; 3] = [
        MiddlewareKind::Compression,
        MiddlewareKind::RedirectWithPrefix,
        MiddlewareKind::CacheControl,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MiddlewareKind::Compression => "gzip",
            MiddlewareKind::RedirectWithPrefix => "redirect_with_prefix",
            MiddlewareKind::CacheControl => "set_cache_control",
        }
    }
}

/// Attaches the framework middleware chain to the sub-application and
/// records it on the context.
pub fn install_chain(mut router: Router, ctx: &Arc<AppContext>) -> Router {
    let mut installed = Vec::with_capacity(MiddlewareKind::INSTALL_ORDER.len());
    for kind in MiddlewareKind::INSTALL_ORDER {
        router = match kind {
            MiddlewareKind::Compression => router.layer(CompressionLayer::new().compress_when(
                DefaultPredicate::new().and(SizeAbove::new(GZIP_MINIMUM_SIZE)),
            )),
            MiddlewareKind::RedirectWithPrefix => {
                router.layer(from_fn_with_state(ctx.clone(), redirect_with_prefix))
            }
            MiddlewareKind::CacheControl => {
                router.layer(from_fn_with_state(ctx.clone(), set_cache_control))
            }
        };
        installed.push(kind);
        debug!(middleware = kind.name(), "Installed middleware");
    }

    ctx.record_middlewares(installed);
    router
}

/// Prefix under which the client reaches the framework: the proxy's
/// `X-Forwarded-Prefix` followed by the mount path.
pub fn public_prefix(headers: &HeaderMap, ctx: &AppContext) -> String {
    let forwarded = headers
        .get(FORWARDED_PREFIX_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().trim_end_matches('/'))
        .unwrap_or("");
    format!("{}{}", forwarded, ctx.config().mount_path.prefix())
}

/// Rewrites site-relative redirects so they keep the public prefix.
pub async fn redirect_with_prefix(
    State(ctx): State<Arc<AppContext>>,
    request: Request,
    next: Next,
) -> Response {
    let prefix = public_prefix(request.headers(), &ctx);
    let mut response = next.run(request).await;
    if prefix.is_empty() {
        return response;
    }

    let rewritten = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .filter(|location| location.starts_with('/') && !location.starts_with("//"))
        .map(|location| format!("{prefix}{location}"));

    if let Some(location) = rewritten {
        match HeaderValue::from_str(&location) {
            Ok(value) => {
                response.headers_mut().insert(header::LOCATION, value);
            }
            Err(e) => warn!("Could not rewrite redirect to {}: {}", location, e),
        }
    }

    response
}

/// Marks successful framework responses as cacheable. A handler that sets
/// its own Cache-Control (the health check's `no-store`) keeps it.
pub async fn set_cache_control(
    State(ctx): State<Arc<AppContext>>,
    request: Request,
    next: Next,
) -> Response {
    let framework_path = request
        .uri()
        .path()
        .starts_with(&format!("{FRAMEWORK_PREFIX}/"));
    let mut response = next.run(request).await;

    if framework_path
        && response.status() == StatusCode::OK
        && !response.headers().contains_key(header::CACHE_CONTROL)
    {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, ctx.config().cache_control.clone());
    }

    response
}
