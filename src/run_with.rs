use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Uri,
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    Router,
};
use tower::ServiceBuilder;
use tracing::info;

use crate::app::{Air, AppContext, Framework};
use crate::host::{FrameworkLifespan, HostApp, Lifespan};
use crate::rest::middleware::FORWARDED_PREFIX_HEADER;
use crate::rest::routes::{create_router, guard_routes, SubAppParts};
use crate::shared::error::LumenError;
use crate::shared::{MountPath, RunOptions};
use crate::storage::Storage;

/// Attaches `framework` to `host`.
///
/// Validates `options` into the run configuration, builds the framework's
/// sub-application with its middleware chain, mounts it under the
/// configured path and wraps the host's lifespan so framework startup runs
/// before it and framework shutdown after it. Returns the composed host
/// together with the framework context.
///
/// `framework` is consumed, so each framework is configured exactly once.
/// Nothing is mounted when validation fails.
pub fn run_with(
    host: HostApp,
    framework: Framework,
    options: RunOptions,
) -> Result<(HostApp, Arc<AppContext>), LumenError> {
    let config = options.validate()?;
    let mount_path = config.mount_path.clone();

    let air = match options.on_air.relay_token() {
        Some(token) => Some(Air::new(token).map_err(LumenError::Tunnel)?),
        None => None,
    };
    let storage = Storage::new(options.storage_secret.clone());

    let default_page = !framework.has_page("/");
    let favicon_route = !framework.has_page("/favicon.ico");
    let Framework {
        pages,
        static_dirs,
        startup_hooks,
        shutdown_hooks,
        ..
    } = framework;

    let ctx = Arc::new(AppContext::new(
        config,
        air,
        storage,
        startup_hooks,
        shutdown_hooks,
    ));

    let sub_app = create_router(
        SubAppParts {
            pages,
            default_page,
            favicon_route,
            static_dirs,
        },
        ctx.clone(),
    )?;

    let (router, host_lifespan) = host.into_parts();
    let router = mount(router, &mount_path, sub_app)?;
    let lifespan: Arc<dyn Lifespan> = Arc::new(FrameworkLifespan::new(ctx.clone(), host_lifespan));

    info!(
        mount_path = %mount_path.as_str(),
        on_air = ctx.air().is_some(),
        browser_storage = ctx.storage().is_browser_storage_enabled(),
        "Lumen attached to host application"
    );

    Ok((HostApp::from_parts(router, lifespan), ctx))
}

/// Mounts `sub_app` under `path`. At the root the sub-application handles
/// every request the host has no route for; elsewhere it is nested below
/// `path`, which itself redirects to `path/`.
fn mount(host: Router, path: &MountPath, sub_app: Router) -> Result<Router, LumenError> {
    if path.is_root() {
        return Ok(host.fallback_service(sub_app));
    }

    let base = path.as_str().to_string();
    let prefix: Arc<str> = Arc::from(base.as_str());
    let index = ServiceBuilder::new()
        .map_request(move |request: Request| strip_prefix(request, &prefix))
        .service(sub_app.clone());

    let router = guard_routes(&format!("cannot mount at '{base}'"), move || {
        host.nest_service(&base, sub_app)
            .route_service(&format!("{base}/"), index)
    })?;

    let base: Arc<str> = Arc::from(path.as_str());
    Ok(router.layer(middleware::from_fn_with_state(base, redirect_to_slash)))
}

/// Sends the bare mount path to its trailing-slash form so relative links
/// on the index page resolve below the mount.
async fn redirect_to_slash(State(base): State<Arc<str>>, request: Request, next: Next) -> Response {
    if request.uri().path() == &*base {
        let forwarded = request
            .headers()
            .get(FORWARDED_PREFIX_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().trim_end_matches('/'))
            .unwrap_or("");
        let target = match request.uri().query() {
            Some(query) => format!("{forwarded}{base}/?{query}"),
            None => format!("{forwarded}{base}/"),
        };
        return Redirect::temporary(&target).into_response();
    }
    next.run(request).await
}

fn strip_prefix(mut request: Request, prefix: &str) -> Request {
    let uri = request.uri();
    let path = uri
        .path()
        .strip_prefix(prefix)
        .filter(|rest| rest.starts_with('/'))
        .unwrap_or("/");
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = path_and_query.parse().ok();
    if let Ok(stripped) = Uri::from_parts(parts) {
        *request.uri_mut() = stripped;
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Path;
    use axum::http::{header, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    async fn status(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn test_strip_prefix_keeps_query() {
        let request = axum::http::Request::builder()
            .uri("/app/page?x=1")
            .body(Body::empty())
            .unwrap();
        let request = strip_prefix(request, "/app");
        assert_eq!(request.uri().path(), "/page");
        assert_eq!(request.uri().query(), Some("x=1"));

        let request = axum::http::Request::builder().uri("/app/").body(Body::empty()).unwrap();
        assert_eq!(strip_prefix(request, "/app").uri().path(), "/");
    }

    #[tokio::test]
    async fn test_mount_at_path() {
        let sub_app = Router::new()
            .route("/", get(|| async { "root" }))
            .route("/inner", get(|| async { "inner" }));
        let host = Router::new().route("/api", get(|| async { "api" }));
        let mounted = mount(host, &MountPath::parse("/app").unwrap(), sub_app).unwrap();

        assert_eq!(status(mounted.clone(), "/api").await, StatusCode::OK);
        assert_eq!(status(mounted.clone(), "/app/").await, StatusCode::OK);
        assert_eq!(status(mounted.clone(), "/app/inner").await, StatusCode::OK);
        assert_eq!(status(mounted.clone(), "/app").await, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(status(mounted, "/inner").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mount_at_path_passes_path_parameters() {
        let sub_app = Router::new()
            .route("/items/{id}", get(|Path(id): Path<u32>| async move { format!("item {id}") }));
        let host = Router::new();
        let mounted = mount(host, &MountPath::parse("/app").unwrap(), sub_app).unwrap();

        let response = mounted
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/app/items/42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"item 42");

        let response = mounted
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/app?tab=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], "/app/?tab=2");

        let response = mounted
            .oneshot(
                axum::http::Request::builder()
                    .uri("/app")
                    .header(FORWARDED_PREFIX_HEADER, "/proxy")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], "/proxy/app/");
    }

    #[tokio::test]
    async fn test_mount_at_root_keeps_host_routes_first() {
        let sub_app = Router::new().route("/", get(|| async { "framework" }));
        let host = Router::new().route("/api", get(|| async { "api" }));
        let mounted = mount(host, &MountPath::root(), sub_app).unwrap();

        assert_eq!(status(mounted.clone(), "/api").await, StatusCode::OK);
        assert_eq!(status(mounted, "/").await, StatusCode::OK);
    }

    #[test]
    fn test_mount_conflict_is_an_error() {
        let host = Router::new().route("/app", get(|| async { "taken" }));
        let result = mount(host, &MountPath::parse("/app").unwrap(), Router::new());
        assert!(matches!(result, Err(LumenError::Mount(_))));
    }
}
