use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::MethodRouter;
use futures::{future::BoxFuture, FutureExt};

pub mod air;
pub mod context;
pub mod lifecycle;

pub use air::Air;
pub use context::AppContext;
pub use lifecycle::Phase;

/// Async callback run during framework startup or shutdown.
pub type Hook = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// The framework's sub-application before it is configured and mounted:
/// pages, static directories and lifecycle hooks.
pub struct Framework {
    pub(crate) pages: Vec<(String, MethodRouter<Arc<AppContext>>)>,
    pub(crate) static_dirs: Vec<(String, PathBuf)>,
    pub(crate) startup_hooks: Vec<Hook>,
    pub(crate) shutdown_hooks: Vec<Hook>,
}

impl Framework {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            static_dirs: Vec::new(),
            startup_hooks: Vec::new(),
            shutdown_hooks: Vec::new(),
        }
    }

    /// Registers a page. Registering `/` replaces the default page. Paths
    /// under `/_lumen` and paths registered twice are rejected when the
    /// framework is attached.
    pub fn page(mut self, path: &str, route: MethodRouter<Arc<AppContext>>) -> Self {
        self.pages.push((path.to_string(), route));
        self
    }

    /// Serves the files of `dir` under `url_path`.
    pub fn add_static_files(mut self, url_path: &str, dir: impl Into<PathBuf>) -> Self {
        self.static_dirs.push((url_path.to_string(), dir.into()));
        self
    }

    pub fn on_startup<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.startup_hooks.push(Box::new(move || hook().boxed()));
        self
    }

    pub fn on_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.shutdown_hooks.push(Box::new(move || hook().boxed()));
        self
    }

    pub(crate) fn has_page(&self, path: &str) -> bool {
        self.pages.iter().any(|(p, _)| p == path)
    }
}

impl Default for Framework {
    fn default() -> Self {
        Self::new()
    }
}
