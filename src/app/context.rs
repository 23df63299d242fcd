use std::sync::Mutex;

use once_cell::sync::OnceCell;

use crate::app::{Air, Hook, Phase};
use crate::rest::middleware::MiddlewareKind;
use crate::shared::RunConfig;
use crate::storage::Storage;

/// Everything the mounted framework knows at runtime. Built once by
/// [`crate::run_with`] and shared with handlers as axum state.
pub struct AppContext {
    config: RunConfig,
    air: Option<Air>,
    storage: Storage,
    pub(crate) startup_hooks: Vec<Hook>,
    pub(crate) shutdown_hooks: Vec<Hook>,
    pub(crate) phase: Mutex<Phase>,
    middlewares: OnceCell<Vec<MiddlewareKind>>,
}

impl AppContext {
    pub(crate) fn new(
        config: RunConfig,
        air: Option<Air>,
        storage: Storage,
        startup_hooks: Vec<Hook>,
        shutdown_hooks: Vec<Hook>,
    ) -> Self {
        Self {
            config,
            air,
            storage,
            startup_hooks,
            shutdown_hooks,
            phase: Mutex::new(Phase::Idle),
            middlewares: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn air(&self) -> Option<&Air> {
        self.air.as_ref()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Middlewares attached to the sub-application, innermost first.
    pub fn installed_middlewares(&self) -> &[MiddlewareKind] {
        self.middlewares.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn record_middlewares(&self, kinds: Vec<MiddlewareKind>) {
        if self.middlewares.set(kinds).is_err() {
            tracing::warn!("Middleware chain already recorded; keeping the first");
        }
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("air", &self.air)
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_context(options: crate::shared::RunOptions) -> std::sync::Arc<AppContext> {
    let config = options.validate().expect("valid test options");
    std::sync::Arc::new(AppContext::new(
        config,
        None,
        Storage::new(options.storage_secret.clone()),
        Vec::new(),
        Vec::new(),
    ))
}
