use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::Extensions,
    response::Html,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::{error, info};

use lumen::rest::error::ApiResult;
use lumen::shared::logging;
use lumen::{run_with, AppContext, BrowserId, Framework, HostApp, Lifespan, LifespanState, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "lumen-demo", about = "Serve a demo host app with Lumen attached")]
struct Args {
    #[arg(long, env = "LUMEN_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "LUMEN_PORT", default_value_t = 8080)]
    port: u16,

    /// JSON run options; defaults apply when omitted
    #[arg(long, env = "LUMEN_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Overrides the mount path from the config file
    #[arg(long)]
    mount_path: Option<String>,

    #[arg(long, env = "LUMEN_LOG_DIR")]
    log_dir: Option<String>,
}

#[derive(Clone)]
struct StartedAt(DateTime<Utc>);

struct DemoLifespan;

#[async_trait]
impl Lifespan for DemoLifespan {
    async fn startup(&self) -> Result<Extensions> {
        info!("Demo host starting");
        let mut state = Extensions::new();
        state.insert(StartedAt(Utc::now()));
        Ok(state)
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Demo host stopped");
        Ok(())
    }
}

async fn uptime(Extension(state): Extension<LifespanState>) -> Json<serde_json::Value> {
    let seconds = state
        .get::<StartedAt>()
        .map(|started| (Utc::now() - started.0).num_seconds());
    Json(serde_json::json!({ "uptime_secs": seconds }))
}

async fn visits(
    State(ctx): State<Arc<AppContext>>,
    request: Request,
) -> ApiResult<Html<String>> {
    let browser = request.extensions().get::<BrowserId>().copied();
    let total = ctx
        .storage()
        .general_get("visits")
        .await
        .and_then(|value| value.as_u64())
        .unwrap_or(0)
        + 1;
    ctx.storage().general_set("visits", total.into()).await;

    let mine = match browser {
        Some(id) => {
            let count = ctx
                .storage()
                .browser_get(&id, "visits")
                .await?
                .and_then(|value| value.as_u64())
                .unwrap_or(0)
                + 1;
            ctx.storage().browser_set(&id, "visits", count.into()).await?;
            format!("<p>Your visits: {count}</p>")
        }
        None => String::new(),
    };

    Ok(Html(format!("<h1>Visits</h1><p>Total visits: {total}</p>{mine}")))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _ = logging::init_logging(args.log_dir.as_deref(), "lumen_demo");

    let mut options = match &args.config {
        Some(path) => RunOptions::load_from_path(path)?,
        None => RunOptions::default(),
    };
    if let Some(mount_path) = args.mount_path {
        options.mount_path = mount_path;
    }

    let host = HostApp::new(Router::new().route("/api/uptime", get(uptime)))
        .with_lifespan(DemoLifespan);
    let framework = Framework::new()
        .page("/visits", get(visits))
        .on_startup(|| async {
            info!("Framework startup hook");
            Ok::<(), anyhow::Error>(())
        });

    let (app, ctx) = match run_with(host, framework, options) {
        Ok(composed) => composed,
        Err(e) => {
            error!("Failed to attach Lumen: {}", e);
            return Err(e.into());
        }
    };

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })?;

    let bind_addr = format!("{}:{}", args.host, args.port);
    info!("Binding to: {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        "Lumen endpoint: http://{}{}",
        bind_addr,
        ctx.config().mount_path.as_str()
    );

    app.serve(listener, async move {
        let _ = shutdown_rx.changed().await;
        info!("Shutting down Lumen demo...");
    })
    .await
}
