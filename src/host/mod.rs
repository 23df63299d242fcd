use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{http::Extensions, Extension, Router};
use futures::FutureExt;
use tokio::net::TcpListener;
use tracing::{error, info};

pub mod lifespan;

pub use lifespan::FrameworkLifespan;

/// Startup/shutdown pair bracketing a host application's serving period.
#[async_trait]
pub trait Lifespan: Send + Sync {
    /// Runs before the first request; the returned state is shared with
    /// every request as a [`LifespanState`] extension.
    async fn startup(&self) -> Result<Extensions>;

    /// Runs after the last request has drained.
    async fn shutdown(&self) -> Result<()>;
}

/// Lifespan of an application that has no startup or shutdown work.
pub struct NoopLifespan;

#[async_trait]
impl Lifespan for NoopLifespan {
    async fn startup(&self) -> Result<Extensions> {
        Ok(Extensions::new())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// State produced by a lifespan's startup, readable from handlers through
/// `Extension<LifespanState>`.
#[derive(Clone, Default, Debug)]
pub struct LifespanState(Arc<Extensions>);

impl LifespanState {
    pub fn new(extensions: Extensions) -> Self {
        Self(Arc::new(extensions))
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.0.get::<T>()
    }
}

/// A host web application: its routes plus its lifespan.
pub struct HostApp {
    router: Router,
    lifespan: Arc<dyn Lifespan>,
}

impl HostApp {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            lifespan: Arc::new(NoopLifespan),
        }
    }

    pub fn with_lifespan(mut self, lifespan: impl Lifespan + 'static) -> Self {
        self.lifespan = Arc::new(lifespan);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn lifespan(&self) -> Arc<dyn Lifespan> {
        self.lifespan.clone()
    }

    pub(crate) fn into_parts(self) -> (Router, Arc<dyn Lifespan>) {
        (self.router, self.lifespan)
    }

    pub(crate) fn from_parts(router: Router, lifespan: Arc<dyn Lifespan>) -> Self {
        Self { router, lifespan }
    }

    /// Enters the lifespan, runs `body` with the request router and the
    /// startup state, then exits the lifespan. Shutdown runs whether the
    /// body returns, fails or panics; a body error takes precedence over a
    /// shutdown error.
    pub async fn run<F, Fut, T>(self, body: F) -> Result<T>
    where
        F: FnOnce(Router, LifespanState) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (router, lifespan) = self.into_parts();

        let state = LifespanState::new(lifespan.startup().await?);
        let router = router.layer(Extension(state.clone()));

        let outcome = AssertUnwindSafe(body(router, state)).catch_unwind().await;
        let shutdown = lifespan.shutdown().await;

        match outcome {
            Err(panic) => {
                if let Err(e) = shutdown {
                    error!("Shutdown failed after a panic in the serving body: {:#}", e);
                }
                std::panic::resume_unwind(panic)
            }
            Ok(Err(e)) => {
                if let Err(shutdown_error) = shutdown {
                    error!("Shutdown failed after serving error: {:#}", shutdown_error);
                }
                Err(e)
            }
            Ok(Ok(value)) => {
                shutdown?;
                Ok(value)
            }
        }
    }

    /// Serves on `listener` inside the lifespan until `signal` resolves and
    /// in-flight requests have drained.
    pub async fn serve<S>(self, listener: TcpListener, signal: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        self.run(|router, _state| async move {
            info!("Ready to accept requests on http://{}", addr);
            axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await?;
            info!("Server stopped accepting requests");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    #[derive(Clone, Debug, PartialEq)]
    struct DbName(&'static str);

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl Lifespan for Arc<Recording> {
        async fn startup(&self) -> Result<Extensions> {
            self.events.lock().unwrap().push("startup");
            let mut state = Extensions::new();
            state.insert(DbName("main"));
            Ok(state)
        }

        async fn shutdown(&self) -> Result<()> {
            self.events.lock().unwrap().push("shutdown");
            Ok(())
        }
    }

    async fn db_name(Extension(state): Extension<LifespanState>) -> String {
        state.get::<DbName>().map(|db| db.0).unwrap_or("none").to_string()
    }

    #[tokio::test]
    async fn test_run_shares_state_with_requests() {
        let recording = Arc::new(Recording::default());
        let host = HostApp::new(Router::new().route("/db", get(db_name)))
            .with_lifespan(recording.clone());

        let status = host
            .run(|router, state| async move {
                assert_eq!(state.get::<DbName>(), Some(&DbName("main")));
                let response = router
                    .oneshot(Request::builder().uri("/db").body(Body::empty())?)
                    .await?;
                let body = axum::body::to_bytes(response.into_body(), 1024).await?;
                assert_eq!(&body[..], b"main");
                Ok::<_, anyhow::Error>(StatusCode::OK)
            })
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(*recording.events.lock().unwrap(), vec!["startup", "shutdown"]);
    }

    #[tokio::test]
    async fn test_shutdown_runs_when_body_fails() {
        let recording = Arc::new(Recording::default());
        let host = HostApp::new(Router::new()).with_lifespan(recording.clone());

        let err = host
            .run(|_, _| async { Err::<(), _>(anyhow::anyhow!("handler exploded")) })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "handler exploded");
        assert_eq!(*recording.events.lock().unwrap(), vec!["startup", "shutdown"]);
    }

    #[tokio::test]
    async fn test_shutdown_runs_when_body_panics() {
        let recording = Arc::new(Recording::default());
        let host = HostApp::new(Router::new()).with_lifespan(recording.clone());

        let outcome = AssertUnwindSafe(host.run(|_, _| async {
            if true {
                panic!("boom");
            }
            Ok::<(), anyhow::Error>(())
        }))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert_eq!(*recording.events.lock().unwrap(), vec!["startup", "shutdown"]);
    }

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = HostApp::new(Router::new().route("/", get(|| async { "ok" })));

        host.serve(listener, async {}).await.unwrap();
    }
}
