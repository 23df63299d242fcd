use std::path::Path;

use tracing::info;
use tracing_appender::non_blocking;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging for a Lumen process: console always, plus a daily
/// rolling file under `log_dir` when that directory is writable.
pub fn init_logging(log_dir: Option<&str>, service_name: &str) -> Result<(), anyhow::Error> {
    // RUST_LOG overrides the default level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let writable_dir = log_dir.filter(|dir| can_write(dir));

    match writable_dir {
        Some(dir) => {
            let _ = rotate_logs_on_startup(dir, service_name);

            let file_appender = tracing_appender::rolling::daily(dir, format!("{service_name}.log"));
            let (non_blocking_file, guard_file) = non_blocking(file_appender);
            let file_layer = fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true);

            let (non_blocking_stdout, guard_stdout) = non_blocking(std::io::stdout());
            let console_layer = fmt::layer()
                .with_writer(non_blocking_stdout)
                .with_ansi(true)
                .with_target(false)
                .with_thread_ids(false)
                .with_line_number(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(console_layer)
                .try_init()?;

            // Writers flush on drop; keep them for the life of the process
            std::mem::forget(guard_file);
            std::mem::forget(guard_stdout);

            info!("Logging initialized - logs will be written to {dir}/{service_name}.log");
        }
        None => {
            let (non_blocking_stdout, guard_stdout) = non_blocking(std::io::stdout());
            let console_layer = fmt::layer()
                .with_writer(non_blocking_stdout)
                .with_ansi(true)
                .with_target(false)
                .with_thread_ids(false)
                .with_line_number(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init()?;

            std::mem::forget(guard_stdout);

            info!("Logging initialized - console output only");
        }
    }

    Ok(())
}

fn can_write(log_dir: &str) -> bool {
    let probe = format!("{log_dir}/.lumen_write_probe");
    std::fs::create_dir_all(log_dir)
        .and_then(|_| std::fs::File::create(&probe))
        .map(|_| std::fs::remove_file(&probe))
        .is_ok()
}

pub fn rotate_logs_on_startup(log_dir: &str, service_name: &str) -> Result<(), anyhow::Error> {
    let log_file = format!("{log_dir}/{service_name}.log");

    if Path::new(&log_file).exists() {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let backup_file = format!("{log_dir}/{service_name}.{timestamp}.log");

        std::fs::rename(&log_file, &backup_file)?;
        info!("Previous log file backed up to: {backup_file}");
    }

    Ok(())
}
