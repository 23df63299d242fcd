use serde::Serialize;
use tracing::{error, info, warn};

use crate::app::AppContext;
use crate::shared::error::LumenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl AppContext {
    pub fn phase(&self) -> Phase {
        match self.phase.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Moves to `next` when the current phase satisfies `allowed`, returning
    /// the phase that was replaced.
    fn transition(&self, allowed: impl Fn(Phase) -> bool, next: Phase) -> Option<Phase> {
        let mut guard = match self.phase.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let current = *guard;
        if allowed(current) {
            *guard = next;
            Some(current)
        } else {
            None
        }
    }

    /// Framework startup: runs startup hooks in registration order, connects
    /// the tunnel and announces the app. Only valid once.
    pub async fn startup(&self) -> Result<(), LumenError> {
        if self
            .transition(|phase| phase == Phase::Idle, Phase::Starting)
            .is_none()
        {
            return Err(LumenError::AlreadyStarted);
        }

        for (index, hook) in self.startup_hooks.iter().enumerate() {
            if let Err(e) = hook().await {
                error!(hook = index, "Startup hook failed: {:#}", e);
                return Err(LumenError::FrameworkStartup(e));
            }
        }

        if let Some(air) = self.air() {
            if let Err(e) = air.connect().await {
                warn!("Could not connect to On Air relay {}: {:#}", air.relay_url(), e);
            }
        }

        self.transition(|phase| phase == Phase::Starting, Phase::Running);

        let config = self.config();
        if config.show_welcome_message {
            info!(
                title = %config.title,
                mount_path = %config.mount_path.as_str(),
                "Lumen ready to go"
            );
        }

        Ok(())
    }

    /// Framework shutdown: runs every shutdown hook even when earlier ones
    /// fail, then disconnects the tunnel. A no-op unless startup began and
    /// shutdown has not run yet.
    pub async fn shutdown(&self) -> Result<(), LumenError> {
        if self
            .transition(
                |phase| matches!(phase, Phase::Starting | Phase::Running),
                Phase::Stopping,
            )
            .is_none()
        {
            return Ok(());
        }

        let mut first_error = None;
        for (index, hook) in self.shutdown_hooks.iter().enumerate() {
            if let Err(e) = hook().await {
                error!(hook = index, "Shutdown hook failed: {:#}", e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        if let Some(air) = self.air() {
            air.disconnect();
        }

        self.transition(|_| true, Phase::Stopped);
        info!("Lumen stopped");

        match first_error {
            Some(e) => Err(LumenError::FrameworkShutdown(e)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::app::Framework;
    use crate::shared::RunOptions;

    fn context(framework: Framework) -> AppContext {
        let config = RunOptions::default().validate().unwrap();
        AppContext::new(
            config,
            None,
            crate::storage::Storage::new(None),
            framework.startup_hooks,
            framework.shutdown_hooks,
        )
    }

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        entry: &'static str,
    ) -> impl Fn() -> futures::future::Ready<anyhow::Result<()>> + Send + Sync + 'static {
        let log = log.clone();
        move || {
            log.lock().unwrap().push(entry.to_string());
            futures::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_hooks_run_in_order_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(
            Framework::new()
                .on_startup(recorder(&log, "start-1"))
                .on_startup(recorder(&log, "start-2"))
                .on_shutdown(recorder(&log, "stop-1")),
        );

        ctx.startup().await.unwrap();
        assert_eq!(ctx.phase(), Phase::Running);
        ctx.shutdown().await.unwrap();
        ctx.shutdown().await.unwrap();

        assert_eq!(ctx.phase(), Phase::Stopped);
        assert_eq!(*log.lock().unwrap(), vec!["start-1", "start-2", "stop-1"]);
    }

    #[tokio::test]
    async fn test_second_startup_rejected() {
        let ctx = context(Framework::new());
        ctx.startup().await.unwrap();
        assert!(matches!(ctx.startup().await, Err(LumenError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_failing_startup_hook_stops_sequence() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(
            Framework::new()
                .on_startup(|| async { Err::<(), _>(anyhow::anyhow!("no database")) })
                .on_startup(recorder(&log, "never")),
        );

        let err = ctx.startup().await.unwrap_err();
        assert!(matches!(err, LumenError::FrameworkStartup(_)));
        assert_eq!(ctx.phase(), Phase::Starting);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_runs_all_hooks_and_reports_first_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(
            Framework::new()
                .on_shutdown(|| async { Err::<(), _>(anyhow::anyhow!("first")) })
                .on_shutdown(|| async { Err::<(), _>(anyhow::anyhow!("second")) })
                .on_shutdown(recorder(&log, "last")),
        );

        ctx.startup().await.unwrap();
        let err = ctx.shutdown().await.unwrap_err();

        assert!(err.to_string().contains("first"));
        assert_eq!(*log.lock().unwrap(), vec!["last"]);
        assert_eq!(ctx.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_before_startup_is_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(Framework::new().on_shutdown(recorder(&log, "stop")));
        ctx.shutdown().await.unwrap();
        assert_eq!(ctx.phase(), Phase::Idle);
        assert!(log.lock().unwrap().is_empty());
    }
}
