use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, MethodRouter},
    Json, Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, info};

use crate::app::AppContext;
use crate::rest::error::{ApiError, ApiResult};
use crate::rest::logging_middleware::request_logging_middleware;
use crate::rest::middleware::{install_chain, public_prefix};
use crate::rest::page::render_index;
use crate::shared::error::LumenError;
use crate::shared::favicon::{emoji_to_svg, Favicon};
use crate::shared::MountPath;
use crate::storage::browser_id_middleware;

pub const FRAMEWORK_PREFIX: &str = "/_lumen";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LUMEN_CSS: &str = include_str!("../../static/lumen.css");
const LUMEN_JS: &str = include_str!("../../static/lumen.js");

/// Versioned path of the built-in assets, relative to the mount path.
pub fn static_base() -> String {
    format!("{FRAMEWORK_PREFIX}/{VERSION}/static")
}

/// What the sub-application serves besides the framework's own routes.
pub struct SubAppParts {
    pub pages: Vec<(String, MethodRouter<Arc<AppContext>>)>,
    pub default_page: bool,
    pub favicon_route: bool,
    pub static_dirs: Vec<(String, PathBuf)>,
}

/// Builds the framework's sub-application: pages, framework routes, the
/// optional browser-id layer and the middleware chain.
pub fn create_router(parts: SubAppParts, ctx: Arc<AppContext>) -> Result<Router, LumenError> {
    check_paths(&parts)?;

    let mut static_dirs = Vec::with_capacity(parts.static_dirs.len());
    for (url_path, dir) in parts.static_dirs {
        let url = MountPath::parse(&url_path)
            .ok()
            .filter(|url| !url.is_root())
            .ok_or_else(|| LumenError::Mount(format!("invalid static files path '{url_path}'")))?;
        static_dirs.push((url, dir));
    }

    let router = guard_routes("cannot register pages", move || {
        let mut router = Router::new();
        for (path, route) in parts.pages {
            router = router.route(&path, route);
        }
        if parts.default_page {
            router = router.route("/", get(index));
        }
        if parts.favicon_route {
            router = router.route("/favicon.ico", get(favicon));
        }

        router = router
            .route(&format!("{}/{{file}}", static_base()), get(static_asset))
            .route(&format!("{FRAMEWORK_PREFIX}/health"), get(health));

        for (url, dir) in static_dirs {
            info!("Serving static files from {} at {}", dir.display(), url.as_str());
            router = router.nest_service(url.as_str(), ServeDir::new(dir));
        }
        router
    })?;

    let mut router = router.fallback(not_found).with_state(ctx.clone());

    if ctx.storage().is_browser_storage_enabled() {
        debug!("Browser storage enabled");
        router = router.layer(middleware::from_fn_with_state(
            ctx.clone(),
            browser_id_middleware,
        ));
    }

    let router = install_chain(router, &ctx);

    Ok(router
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http()))
}

/// Rejects application paths that shadow framework routes or repeat an
/// earlier registration.
fn check_paths(parts: &SubAppParts) -> Result<(), LumenError> {
    let mut seen = HashSet::new();
    let pages = parts.pages.iter().map(|(path, _)| path);
    let dirs = parts.static_dirs.iter().map(|(path, _)| path);

    for path in pages.chain(dirs) {
        let normalized = path.trim_end_matches('/');
        if normalized == FRAMEWORK_PREFIX || normalized.starts_with(&format!("{FRAMEWORK_PREFIX}/")) {
            return Err(LumenError::Mount(format!(
                "'{path}' is reserved for framework routes under {FRAMEWORK_PREFIX}"
            )));
        }
        if !seen.insert(normalized) {
            return Err(LumenError::Mount(format!("'{path}' is registered twice")));
        }
    }
    Ok(())
}

/// Runs a router-building step, turning axum's panic on overlapping or
/// malformed routes into [`LumenError::Mount`].
pub(crate) fn guard_routes<T>(context: &str, build: impl FnOnce() -> T) -> Result<T, LumenError> {
    catch_unwind(AssertUnwindSafe(build)).map_err(|panic| {
        let reason = panic
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
            .unwrap_or_else(|| "route conflict".to_string());
        LumenError::Mount(format!("{context}: {reason}"))
    })
}

async fn index(State(ctx): State<Arc<AppContext>>, headers: HeaderMap) -> Html<String> {
    let prefix = public_prefix(&headers, &ctx);
    Html(render_index(ctx.config(), &prefix))
}

async fn favicon(State(ctx): State<Arc<AppContext>>) -> ApiResult<Response> {
    let response = match &ctx.config().favicon {
        Favicon::Default => svg(Favicon::default_svg().to_string()),
        Favicon::Emoji(emoji) => svg(emoji_to_svg(emoji)),
        Favicon::Url(url) => Redirect::temporary(url).into_response(),
        Favicon::DataUrl { mime, bytes } => {
            ([(header::CONTENT_TYPE, mime.clone())], bytes.clone()).into_response()
        }
        Favicon::Path(path) => {
            let bytes = tokio::fs::read(path).await.map_err(|e| {
                ApiError::NotFound(format!("favicon {} not readable: {}", path.display(), e))
            })?;
            ([(header::CONTENT_TYPE, image_mime(path).to_string())], bytes).into_response()
        }
    };
    Ok(response)
}

fn svg(body: String) -> Response {
    ([(header::CONTENT_TYPE, "image/svg+xml")], body).into_response()
}

fn image_mime(path: &FsPath) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("ico") => "image/x-icon",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

async fn static_asset(Path(file): Path<String>) -> ApiResult<Response> {
    let (content_type, body) = match file.as_str() {
        "lumen.css" => ("text/css; charset=utf-8", LUMEN_CSS),
        "lumen.js" => ("text/javascript; charset=utf-8", LUMEN_JS),
        _ => return Err(ApiError::NotFound(format!("no static asset named '{file}'"))),
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

async fn health(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(serde_json::json!({
            "status": "healthy",
            "service": "lumen",
            "version": VERSION,
            "phase": ctx.phase(),
            "on_air": ctx.air().map(|air| air.is_connected()),
        })),
    )
}

async fn not_found() -> impl IntoResponse {
    let html = r#"<!DOCTYPE html>
<html>
<head>
    <title>404</title>
    <style>
        html, body {
            height: 100%;
            margin: 0;
            display: flex;
            justify-content: center;
            align-items: center;
            font-family: Arial, sans-serif;
        }
        h1 {
            font-size: 72px;
            font-weight: normal;
        }
    </style>
</head>
<body>
    <h1>404</h1>
</body>
</html>
"#;
    (StatusCode::NOT_FOUND, Html(html))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::context::test_context;
    use crate::shared::RunOptions;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(options: RunOptions) -> Router {
        let parts = SubAppParts {
            pages: Vec::new(),
            default_page: true,
            favicon_route: true,
            static_dirs: Vec::new(),
        };
        create_router(parts, test_context(options)).unwrap()
    }

    async fn get_response(router: Router, uri: &str) -> Response {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_default_page_is_served() {
        let response = get_response(app(RunOptions::default()), "/").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 100_000).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("<title>Lumen</title>"));
    }

    #[tokio::test]
    async fn test_builtin_assets_are_versioned_and_cached() {
        let uri = format!("{}/lumen.css", static_base());
        let response = get_response(app(RunOptions::default()), &uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(header::CACHE_CONTROL));

        let uri = format!("{}/missing.js", static_base());
        let response = get_response(app(RunOptions::default()), &uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_is_not_cached() {
        let response = get_response(app(RunOptions::default()), "/_lumen/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

        let body = axum::body::to_bytes(response.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["phase"], "idle");
        assert!(parsed["on_air"].is_null());
    }

    #[tokio::test]
    async fn test_favicon_variants() {
        let response = get_response(app(RunOptions::default()), "/favicon.ico").await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/svg+xml");

        let response = get_response(
            app(RunOptions {
                favicon: Some("🚀".to_string()),
                ..RunOptions::default()
            }),
            "/favicon.ico",
        )
        .await;
        let body = axum::body::to_bytes(response.into_body(), 10_000).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("🚀"));

        let response = get_response(
            app(RunOptions {
                favicon: Some("https://cdn.example.com/icon.png".to_string()),
                ..RunOptions::default()
            }),
            "/favicon.ico",
        )
        .await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://cdn.example.com/icon.png"
        );
    }

    #[tokio::test]
    async fn test_favicon_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon.png");
        std::fs::write(&path, b"png-bytes").unwrap();

        let response = get_response(
            app(RunOptions {
                favicon: Some(path.display().to_string()),
                ..RunOptions::default()
            }),
            "/favicon.ico",
        )
        .await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let body = axum::body::to_bytes(response.into_body(), 10_000).await.unwrap();
        assert_eq!(&body[..], b"png-bytes");

        let response = get_response(
            app(RunOptions {
                favicon: Some("/nonexistent/icon.png".to_string()),
                ..RunOptions::default()
            }),
            "/favicon.ico",
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_static_dirs_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello").unwrap();

        let parts = SubAppParts {
            pages: Vec::new(),
            default_page: true,
            favicon_route: true,
            static_dirs: vec![("/files".to_string(), dir.path().to_path_buf())],
        };
        let router = create_router(parts, test_context(RunOptions::default())).unwrap();

        let response = get_response(router.clone(), "/files/hello.txt").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_response(router, "/nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    fn parts_with(pages: &[&str], static_dirs: &[&str]) -> SubAppParts {
        SubAppParts {
            pages: pages
                .iter()
                .map(|path| (path.to_string(), get(|| async { "page" })))
                .collect(),
            default_page: true,
            favicon_route: true,
            static_dirs: static_dirs
                .iter()
                .map(|path| (path.to_string(), PathBuf::from(".")))
                .collect(),
        }
    }

    #[test]
    fn test_framework_paths_are_reserved() {
        for parts in [
            parts_with(&["/_lumen/health"], &[]),
            parts_with(&["/_lumen"], &[]),
            parts_with(&[], &["/_lumen/assets"]),
        ] {
            let result = create_router(parts, test_context(RunOptions::default()));
            assert!(matches!(result, Err(LumenError::Mount(_))));
        }
    }

    #[test]
    fn test_duplicate_and_overlapping_paths_are_errors() {
        let result = create_router(
            parts_with(&["/about", "/about"], &[]),
            test_context(RunOptions::default()),
        );
        assert!(matches!(result, Err(LumenError::Mount(_))));

        let result = create_router(
            parts_with(&["/files/{*rest}"], &["/files"]),
            test_context(RunOptions::default()),
        );
        assert!(matches!(result, Err(LumenError::Mount(_))));
    }

    #[tokio::test]
    async fn test_page_with_path_parameter() {
        let parts = SubAppParts {
            pages: vec![(
                "/items/{id}".to_string(),
                get(|Path(id): Path<u32>| async move { format!("item {id}") }),
            )],
            default_page: true,
            favicon_route: true,
            static_dirs: Vec::new(),
        };
        let router = create_router(parts, test_context(RunOptions::default())).unwrap();
        let response = get_response(router, "/items/7").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_root_static_dir_rejected() {
        let parts = SubAppParts {
            pages: Vec::new(),
            default_page: true,
            favicon_route: true,
            static_dirs: vec![("/".to_string(), PathBuf::from("."))],
        };
        let result = create_router(parts, test_context(RunOptions::default()));
        assert!(matches!(result, Err(LumenError::Mount(_))));
    }
}
