use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::Extensions;
use tracing::{error, warn};

use crate::app::AppContext;
use crate::host::Lifespan;
use crate::shared::error::LumenError;

/// Host lifespan wrapped so that framework startup runs before it and
/// framework shutdown after it.
pub struct FrameworkLifespan {
    framework: Arc<AppContext>,
    host: Arc<dyn Lifespan>,
}

impl FrameworkLifespan {
    pub fn new(framework: Arc<AppContext>, host: Arc<dyn Lifespan>) -> Self {
        Self { framework, host }
    }
}

#[async_trait]
impl Lifespan for FrameworkLifespan {
    async fn startup(&self) -> Result<Extensions> {
        match self.framework.startup().await {
            Ok(()) => {}
            Err(LumenError::AlreadyStarted) => return Err(LumenError::AlreadyStarted.into()),
            Err(e) => {
                // Release whatever the hooks that did run acquired
                if let Err(cleanup) = self.framework.shutdown().await {
                    warn!("Framework cleanup after failed startup also failed: {}", cleanup);
                }
                return Err(e.into());
            }
        }

        match self.host.startup().await {
            Ok(state) => Ok(state),
            Err(e) => {
                if let Err(cleanup) = self.framework.shutdown().await {
                    error!("Framework shutdown after failed host startup failed: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        let host = self.host.shutdown().await;
        let framework = self.framework.shutdown().await;

        match (host, framework) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(framework_error)) => Err(framework_error.into()),
            (Err(host_error), Ok(())) => Err(host_error),
            (Err(host_error), Err(framework_error)) => {
                error!("Framework shutdown failed after host shutdown error: {}", framework_error);
                Err(host_error)
            }
        }
    }
}
